//! Pipeline commands.
//!
//! Every command that concerns a single talk is partitioned by the talk id,
//! so the Tokio bus never runs two of them for the same talk at once.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::domain::foundation::{Command, TalkId, TalkMessageId, Timestamp};

/// An inbound message was persisted and should be processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessTalkMessageCommand {
    pub talk_message_id: TalkMessageId,
    /// Talk the message belongs to; used for partitioning only.
    pub talk_id: TalkId,
}

impl Command for ProcessTalkMessageCommand {
    const COMMAND_TYPE: &'static str = "talk.process_message.v1";

    fn partition_key(&self) -> Option<String> {
        Some(self.talk_id.to_string())
    }
}

/// Re-check whether the talk's current step is complete and route it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluateStepCompletionCommand {
    pub talk_id: TalkId,
}

impl Command for EvaluateStepCompletionCommand {
    const COMMAND_TYPE: &'static str = "talk.evaluate_step_completion.v1";

    fn partition_key(&self) -> Option<String> {
        Some(self.talk_id.to_string())
    }
}

/// Produce the agent's next outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateAgentResponseCommand {
    pub talk_id: TalkId,
    /// Body of the inbound message that triggered the reply.
    #[serde(default)]
    pub context_message: Option<String>,
}

impl Command for GenerateAgentResponseCommand {
    const COMMAND_TYPE: &'static str = "talk.generate_agent_response.v1";

    fn partition_key(&self) -> Option<String> {
        Some(self.talk_id.to_string())
    }
}

/// Lifecycle event for the audit side channel.
///
/// `entity_id` is free text: events raised before an entity has a durable
/// id still get logged, they just are not persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEventMessage {
    pub action: String,
    pub entity_class: String,
    #[serde(default)]
    pub entity_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub user_email: Option<String>,
    pub timestamp: Timestamp,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub changes: Option<JsonValue>,
}

impl AuditEventMessage {
    pub fn new(
        action: impl Into<String>,
        entity_class: impl Into<String>,
        entity_id: Option<String>,
    ) -> Self {
        Self {
            action: action.into(),
            entity_class: entity_class.into(),
            entity_id,
            user_id: None,
            user_email: None,
            timestamp: Timestamp::now(),
            ip_address: None,
            user_agent: None,
            changes: None,
        }
    }

    pub fn with_changes(mut self, changes: JsonValue) -> Self {
        self.changes = Some(changes);
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>, email: Option<String>) -> Self {
        self.user_id = Some(user_id.into());
        self.user_email = email;
        self
    }
}

impl Command for AuditEventMessage {
    const COMMAND_TYPE: &'static str = "audit.event.v1";
}
