//! Audit side channel: the trail that publishes events and the handler
//! that records them.

mod audit_event;
mod audit_trail;

pub use audit_event::AuditEventHandler;
pub use audit_trail::{AuditTrail, TALK_ENTITY, TALK_MESSAGE_ENTITY};
