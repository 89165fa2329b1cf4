//! Command infrastructure shared by the pipeline and the bus.
//!
//! - `Command` - Trait every typed command implements
//! - `CommandEnvelope` - Transport wrapper carrying the JSON payload
//! - `CommandMetadata` - Correlation context inherited along a command chain
//!
//! Instead of each command struct repeating `correlation_id`, `causation_id`
//! and `source` fields, envelopes carry a single `CommandMetadata` that
//! downstream commands inherit from the command that caused them.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::{CommandId, DomainError, ErrorCode, Timestamp, UserId};

// ============================================
// Command Trait
// ============================================

/// Trait that all dispatchable commands implement.
///
/// # Example
///
/// ```ignore
/// impl Command for EvaluateStepCompletionCommand {
///     const COMMAND_TYPE: &'static str = "talk.evaluate_step_completion.v1";
///
///     fn partition_key(&self) -> Option<String> {
///         Some(self.talk_id.to_string())
///     }
/// }
/// ```
pub trait Command: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Routing key, versioned with a `.vN` suffix.
    const COMMAND_TYPE: &'static str;

    /// Key serializing commands that touch the same aggregate.
    ///
    /// Commands sharing a key are never handled concurrently by a
    /// partitioned bus. `None` lets the bus place the command freely.
    fn partition_key(&self) -> Option<String> {
        None
    }

    /// Wraps the command for transport.
    fn to_envelope(&self, metadata: CommandMetadata) -> Result<CommandEnvelope, DomainError> {
        let payload = serde_json::to_value(self).map_err(|e| {
            DomainError::new(ErrorCode::SerializationError, e.to_string())
                .with_detail("command_type", Self::COMMAND_TYPE)
        })?;
        Ok(CommandEnvelope::new(Self::COMMAND_TYPE, self.partition_key(), payload)
            .with_metadata(metadata))
    }
}

// ============================================
// CommandEnvelope
// ============================================

/// Transport envelope for commands.
///
/// Wraps the command payload with what the bus needs for:
/// - Routing (command_type)
/// - Deduplication (command_id)
/// - Ordering (partition_key)
/// - Retry bookkeeping (attempt)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    /// Unique ID for this command instance.
    pub command_id: CommandId,

    /// Command type for routing (e.g., "talk.process_message.v1").
    pub command_type: String,

    /// Aggregate key; `None` for commands not tied to one talk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_key: Option<String>,

    /// Command-specific payload as JSON.
    pub payload: JsonValue,

    /// Tracing and correlation metadata.
    #[serde(default)]
    pub metadata: CommandMetadata,

    pub dispatched_at: Timestamp,

    /// Delivery attempt, starting at 1.
    pub attempt: u32,
}

impl CommandEnvelope {
    pub fn new(
        command_type: impl Into<String>,
        partition_key: Option<String>,
        payload: JsonValue,
    ) -> Self {
        Self {
            command_id: CommandId::new(),
            command_type: command_type.into(),
            partition_key,
            payload,
            metadata: CommandMetadata::default(),
            dispatched_at: Timestamp::now(),
            attempt: 1,
        }
    }

    /// Builder: replace the metadata.
    pub fn with_metadata(mut self, metadata: CommandMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Same command, next delivery attempt.
    pub fn next_attempt(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self.clone()
        }
    }

    /// Deserialize payload to a specific command type.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

// ============================================
// CommandMetadata
// ============================================

/// Metadata context for command processing.
///
/// Links a chain of commands (inbound message → completion evaluation →
/// response generation → audit) under one correlation id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandMetadata {
    /// The user that triggered the chain, when a human did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,

    /// Links related commands across a single inbound event.
    #[serde(skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,

    /// Id of the command whose handler dispatched this one.
    #[serde(skip_serializing_if = "Option::is_none")]
    causation_id: Option<String>,

    /// Source of this command (e.g., "ingest", "pipeline", "scheduler").
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<String>,
}

impl CommandMetadata {
    /// Creates empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: Set the acting user.
    pub fn with_user_id(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Builder: Add correlation ID for request tracing.
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Builder: Add causation ID.
    pub fn with_causation_id(mut self, id: impl Into<String>) -> Self {
        self.causation_id = Some(id.into());
        self
    }

    /// Builder: Add source identifier.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Derives metadata for a command caused by the command `parent_id`.
    ///
    /// Correlation and user are inherited; causation points at the parent.
    pub fn caused_by(&self, parent_id: &CommandId) -> Self {
        Self {
            user_id: self.user_id.clone(),
            correlation_id: Some(self.correlation_id()),
            causation_id: Some(parent_id.to_string()),
            source: Some("pipeline".to_string()),
        }
    }

    /// Returns the correlation ID, generating one if not set.
    pub fn correlation_id(&self) -> String {
        self.correlation_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string())
    }

    /// Returns the correlation ID only if explicitly set.
    pub fn correlation_id_opt(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// Returns the causation ID if set.
    pub fn causation_id(&self) -> Option<&str> {
        self.causation_id.as_deref()
    }

    /// Returns the source if set.
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }
}
