//! Application handlers.
//!
//! - `talk` - the three talk pipeline handlers
//! - `audit` - audit trail publisher and the audit event handler

pub mod audit;
pub mod talk;

pub use audit::{AuditEventHandler, AuditTrail};
pub use talk::{
    EvaluateStepCompletionHandler, GenerateAgentResponseHandler, ProcessTalkMessageHandler,
    DEFAULT_HISTORY_WINDOW,
};
