//! AuditEventHandler - persists audit events off the critical path.
//!
//! Every event is logged. Only events whose entity id is a UUID are written
//! to the audit log, and a failing write is logged and dropped. The handler
//! therefore never returns an error.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::application::commands::AuditEventMessage;
use crate::domain::audit::{AuditLog, AuditMetadata};
use crate::domain::foundation::UserId;
use crate::ports::{AuditLogRepository, CommandContext, CommandHandler, HandlerError};

pub struct AuditEventHandler {
    repository: Arc<dyn AuditLogRepository>,
}

impl AuditEventHandler {
    pub fn new(repository: Arc<dyn AuditLogRepository>) -> Self {
        Self { repository }
    }

    fn to_audit_log(event: AuditEventMessage, entity_id: Uuid) -> AuditLog {
        let user_id = event.user_id.and_then(|id| UserId::new(id).ok());
        let metadata = AuditMetadata {
            ip_address: event.ip_address,
            user_agent: event.user_agent,
            user_email: event.user_email,
        };

        AuditLog::new(event.action, event.entity_class, Some(entity_id), event.timestamp)
            .with_user(user_id)
            .with_changes(event.changes)
            .with_metadata(metadata)
    }
}

#[async_trait]
impl CommandHandler<AuditEventMessage> for AuditEventHandler {
    async fn handle(
        &self,
        event: AuditEventMessage,
        ctx: CommandContext,
    ) -> Result<(), HandlerError> {
        tracing::info!(
            action = %event.action,
            entity_class = %event.entity_class,
            entity_id = ?event.entity_id,
            user_id = ?event.user_id,
            correlation_id = ?ctx.metadata.correlation_id_opt(),
            "Audit event"
        );

        let Some(entity_id) = event
            .entity_id
            .as_deref()
            .and_then(|id| Uuid::parse_str(id.trim()).ok())
        else {
            return Ok(());
        };

        let action = event.action.clone();
        let log = Self::to_audit_log(event, entity_id);
        if let Err(err) = self.repository.save(&log).await {
            tracing::error!(
                action = %action,
                entity_id = %entity_id,
                error = %err,
                "Failed to persist audit log"
            );
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "AuditEventHandler"
    }
}
