//! Strongly-typed identifier value objects.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::ValidationError;

/// Declares a UUID-backed identifier with the standard constructor set.
macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an identifier from an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the inner UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a live conversation.
    TalkId
);

uuid_id!(
    /// Unique identifier for a single message within a talk.
    TalkMessageId
);

uuid_id!(
    /// Unique identifier for a flow definition (tree flow).
    TreeFlowId
);

uuid_id!(
    /// Unique identifier for a step within a flow.
    StepId
);

uuid_id!(
    /// Unique identifier for a question asked by a step.
    QuestionId
);

uuid_id!(
    /// Unique identifier for a step input slot.
    InputId
);

uuid_id!(
    /// Unique identifier for a step output slot.
    OutputId
);

uuid_id!(
    /// Unique identifier for an agent persona.
    AgentId
);

uuid_id!(
    /// Unique identifier for the organization that owns talks and agents.
    OrganizationId
);

uuid_id!(
    /// Unique identifier for a durable audit log row.
    AuditLogId
);

uuid_id!(
    /// Unique identifier for a dispatched command (deduplication key).
    CommandId
);

/// Identifier of a human user, as issued by the identity provider.
///
/// Kept as an opaque string; audit events may reference users that this
/// service has never seen.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Creates a new UserId, returning error if empty.
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ValidationError::empty_field("user_id"));
        }
        Ok(Self(id))
    }

    /// Returns the inner string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
