//! In-memory TalkMessage repository.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::foundation::{DomainError, TalkId, TalkMessageId};
use crate::domain::talk::TalkMessage;
use crate::ports::TalkMessageRepository;

/// Append-only message log kept in insertion order.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTalkMessageRepository {
    messages: Arc<RwLock<Vec<TalkMessage>>>,
}

impl InMemoryTalkMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages of a talk, oldest first.
    pub async fn all_for_talk(&self, talk_id: &TalkId) -> Vec<TalkMessage> {
        let mut messages: Vec<_> = self
            .messages
            .read()
            .await
            .iter()
            .filter(|m| m.talk_id() == *talk_id)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.sent_at());
        messages
    }
}

#[async_trait]
impl TalkMessageRepository for InMemoryTalkMessageRepository {
    async fn find_by_id(&self, id: &TalkMessageId) -> Result<Option<TalkMessage>, DomainError> {
        Ok(self
            .messages
            .read()
            .await
            .iter()
            .find(|m| m.id() == *id)
            .cloned())
    }

    async fn save(&self, message: &TalkMessage) -> Result<(), DomainError> {
        let mut messages = self.messages.write().await;
        if !messages.iter().any(|m| m.id() == message.id()) {
            messages.push(message.clone());
        }
        Ok(())
    }

    async fn recent_for_talk(
        &self,
        talk_id: &TalkId,
        limit: usize,
    ) -> Result<Vec<TalkMessage>, DomainError> {
        let messages = self.all_for_talk(talk_id).await;
        let skip = messages.len().saturating_sub(limit);
        Ok(messages.into_iter().skip(skip).collect())
    }

    async fn latest_inbound(&self, talk_id: &TalkId) -> Result<Option<TalkMessage>, DomainError> {
        Ok(self
            .all_for_talk(talk_id)
            .await
            .into_iter()
            .rev()
            .find(TalkMessage::is_inbound))
    }
}
