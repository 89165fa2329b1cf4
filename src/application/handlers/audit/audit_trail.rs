//! AuditTrail - publishes audit events without ever failing the caller.

use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::application::commands::AuditEventMessage;
use crate::domain::talk::{Talk, TalkMessage};
use crate::ports::{CommandContext, CommandDispatcher, CommandDispatcherExt};

/// Entity class names used in audit rows.
pub const TALK_ENTITY: &str = "Talk";
pub const TALK_MESSAGE_ENTITY: &str = "TalkMessage";

#[derive(Clone)]
pub struct AuditTrail {
    dispatcher: Arc<dyn CommandDispatcher>,
}

impl AuditTrail {
    pub fn new(dispatcher: Arc<dyn CommandDispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Dispatches an audit event. Dispatch failures are logged at warn.
    pub async fn record(&self, event: AuditEventMessage, ctx: &CommandContext) {
        let mut event = event;
        if event.user_id.is_none() {
            event.user_id = ctx.metadata.user_id.as_ref().map(|u| u.to_string());
        }

        if let Err(err) = self.dispatcher.send(&event, ctx.child_metadata()).await {
            tracing::warn!(
                action = %event.action,
                entity_class = %event.entity_class,
                entity_id = ?event.entity_id,
                error = %err,
                "Failed to dispatch audit event"
            );
        }
    }

    pub async fn talk_event(
        &self,
        action: &str,
        talk: &Talk,
        changes: JsonValue,
        ctx: &CommandContext,
    ) {
        let event = AuditEventMessage::new(action, TALK_ENTITY, Some(talk.id().to_string()))
            .with_changes(changes);
        self.record(event, ctx).await;
    }

    pub async fn message_event(
        &self,
        action: &str,
        message: &TalkMessage,
        changes: JsonValue,
        ctx: &CommandContext,
    ) {
        let event =
            AuditEventMessage::new(action, TALK_MESSAGE_ENTITY, Some(message.id().to_string()))
                .with_changes(changes);
        self.record(event, ctx).await;
    }
}
