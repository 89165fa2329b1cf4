//! In-memory AuditLog repository.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::audit::AuditLog;
use crate::domain::foundation::DomainError;
use crate::ports::AuditLogRepository;

#[derive(Debug, Clone, Default)]
pub struct InMemoryAuditLogRepository {
    logs: Arc<RwLock<Vec<AuditLog>>>,
    fail_saves: Arc<AtomicBool>,
}

impl InMemoryAuditLogRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following `save` fail with a database error (for tests).
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub async fn all(&self) -> Vec<AuditLog> {
        self.logs.read().await.clone()
    }

    /// Recorded actions in order, e.g. `["talk.paused"]`.
    pub async fn actions(&self) -> Vec<String> {
        self.logs.read().await.iter().map(|l| l.action.clone()).collect()
    }
}

#[async_trait]
impl AuditLogRepository for InMemoryAuditLogRepository {
    async fn save(&self, log: &AuditLog) -> Result<(), DomainError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(DomainError::database("audit store unavailable"));
        }
        self.logs.write().await.push(log.clone());
        Ok(())
    }

    async fn find_by_entity(&self, entity_id: &Uuid) -> Result<Vec<AuditLog>, DomainError> {
        Ok(self
            .logs
            .read()
            .await
            .iter()
            .filter(|l| l.entity_id.as_ref() == Some(entity_id))
            .cloned()
            .collect())
    }
}
