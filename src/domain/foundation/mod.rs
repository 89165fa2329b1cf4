//! Foundation module - Shared domain primitives.
//!
//! Contains value objects, identifiers, and error types
//! that form the vocabulary of the talk automation domain.

mod command;
mod errors;
mod ids;
mod state_machine;
mod timestamp;

pub use command::{Command, CommandEnvelope, CommandMetadata};
pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::{
    AgentId, AuditLogId, CommandId, InputId, OrganizationId, OutputId, QuestionId, StepId,
    TalkId, TalkMessageId, TreeFlowId, UserId,
};
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;
