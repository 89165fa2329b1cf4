//! Audit log - write-once record of lifecycle events.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::domain::foundation::{AuditLogId, Timestamp, UserId};

/// Request context captured with an audit event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
}

impl AuditMetadata {
    pub fn is_empty(&self) -> bool {
        self.ip_address.is_none() && self.user_agent.is_none() && self.user_email.is_none()
    }
}

/// Durable audit row. Never updated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: AuditLogId,
    /// Dotted action name, e.g. `talk.paused`.
    pub action: String,
    pub entity_class: String,
    pub entity_id: Option<uuid::Uuid>,
    pub user_id: Option<UserId>,
    pub changes: Option<JsonValue>,
    pub metadata: Option<AuditMetadata>,
    pub created_at: Timestamp,
}

impl AuditLog {
    pub fn new(
        action: impl Into<String>,
        entity_class: impl Into<String>,
        entity_id: Option<uuid::Uuid>,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id: AuditLogId::new(),
            action: action.into(),
            entity_class: entity_class.into(),
            entity_id,
            user_id: None,
            changes: None,
            metadata: None,
            created_at,
        }
    }

    pub fn with_user(mut self, user_id: Option<UserId>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn with_changes(mut self, changes: Option<JsonValue>) -> Self {
        self.changes = changes;
        self
    }

    /// Attaches metadata, dropping it when every field is empty.
    pub fn with_metadata(mut self, metadata: AuditMetadata) -> Self {
        self.metadata = (!metadata.is_empty()).then_some(metadata);
        self
    }
}
