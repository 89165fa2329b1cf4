//! Commands the bus gave up on.

use crate::domain::foundation::{CommandEnvelope, Timestamp};
use crate::ports::HandlerError;

/// A command that exhausted its attempts or was rejected.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub envelope: CommandEnvelope,
    pub error: String,
    pub retryable: bool,
    pub dead_at: Timestamp,
}

impl DeadLetter {
    pub fn new(envelope: CommandEnvelope, error: &HandlerError) -> Self {
        tracing::error!(
            command_id = %envelope.command_id,
            command_type = %envelope.command_type,
            attempt = envelope.attempt,
            error = %error,
            "Command dead-lettered"
        );
        Self {
            envelope,
            error: error.to_string(),
            retryable: error.is_retryable(),
            dead_at: Timestamp::now(),
        }
    }
}
