//! AuditLog repository port. Rows are write-once.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::audit::AuditLog;
use crate::domain::foundation::DomainError;

#[async_trait]
pub trait AuditLogRepository: Send + Sync {
    /// Append an audit row.
    async fn save(&self, log: &AuditLog) -> Result<(), DomainError>;

    /// Rows recorded for an entity, oldest first.
    async fn find_by_entity(&self, entity_id: &Uuid) -> Result<Vec<AuditLog>, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audit_log_repository_is_object_safe() {
        fn _accepts_dyn(_repo: &dyn AuditLogRepository) {}
    }
}
