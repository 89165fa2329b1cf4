//! In-memory ProcessedCommandStore for tests and single-process runs.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::foundation::{CommandId, DomainError, Timestamp};
use crate::ports::ProcessedCommandStore;

#[derive(Default)]
pub struct InMemoryProcessedCommandStore {
    processed: RwLock<HashMap<(CommandId, String), Timestamp>>,
}

impl InMemoryProcessedCommandStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.processed.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.processed.read().await.is_empty()
    }
}

#[async_trait]
impl ProcessedCommandStore for InMemoryProcessedCommandStore {
    async fn contains(
        &self,
        command_id: &CommandId,
        handler_name: &str,
    ) -> Result<bool, DomainError> {
        let key = (*command_id, handler_name.to_string());
        Ok(self.processed.read().await.contains_key(&key))
    }

    async fn mark_processed(
        &self,
        command_id: &CommandId,
        handler_name: &str,
    ) -> Result<(), DomainError> {
        self.processed
            .write()
            .await
            .entry((*command_id, handler_name.to_string()))
            .or_insert_with(Timestamp::now);
        Ok(())
    }

    async fn delete_before(&self, timestamp: Timestamp) -> Result<u64, DomainError> {
        let mut processed = self.processed.write().await;
        let before = processed.len();
        processed.retain(|_, at| !at.is_before(&timestamp));
        Ok((before - processed.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn handlers_track_separately() {
        let store = InMemoryProcessedCommandStore::new();
        let id = CommandId::new();

        store.mark_processed(&id, "HandlerA").await.unwrap();

        assert!(store.contains(&id, "HandlerA").await.unwrap());
        assert!(!store.contains(&id, "HandlerB").await.unwrap());
    }

    #[tokio::test]
    async fn mark_processed_is_idempotent() {
        let store = InMemoryProcessedCommandStore::new();
        let id = CommandId::new();

        store.mark_processed(&id, "Handler").await.unwrap();
        store.mark_processed(&id, "Handler").await.unwrap();

        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn delete_before_removes_old_entries() {
        let store = InMemoryProcessedCommandStore::new();
        store.mark_processed(&CommandId::new(), "Handler").await.unwrap();

        let removed = store
            .delete_before(Timestamp::now().plus_secs(60))
            .await
            .unwrap();

        assert_eq!(removed, 1);
        assert_eq!(store.len().await, 0);
    }
}
