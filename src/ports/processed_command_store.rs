//! ProcessedCommandStore port - Interface for tracking handled commands.
//!
//! Enables idempotent handling by recording which commands each handler has
//! completed. Commands may be delivered more than once because of:
//! - Bus retries after a handler error
//! - Worker restarts before acknowledgment
//! - Producers re-dispatching after a timeout

use async_trait::async_trait;

use crate::domain::foundation::{CommandId, DomainError, Timestamp};

/// Port for tracking which commands have been handled by which handlers.
///
/// # Example
///
/// ```ignore
/// if store.contains(&command_id, "AuditEventHandler").await? {
///     return Ok(()); // Skip duplicate
/// }
/// // Handle command...
/// store.mark_processed(&command_id, "AuditEventHandler").await?;
/// ```
#[async_trait]
pub trait ProcessedCommandStore: Send + Sync {
    /// Check if a command has been handled by a specific handler.
    async fn contains(&self, command_id: &CommandId, handler_name: &str)
        -> Result<bool, DomainError>;

    /// Mark a command as handled. Call only after the handler succeeded.
    async fn mark_processed(
        &self,
        command_id: &CommandId,
        handler_name: &str,
    ) -> Result<(), DomainError>;

    /// Delete entries recorded before `timestamp`. Returns the number removed.
    async fn delete_before(&self, timestamp: Timestamp) -> Result<u64, DomainError>;
}
