//! IdempotentHandler - Wrapper skipping commands a handler already completed.
//!
//! ## How It Works
//!
//! 1. Before handling: check whether this handler completed the command id
//! 2. If already completed: skip and return Ok
//! 3. Otherwise delegate to the inner handler
//! 4. After successful handling: mark the command as processed
//!
//! ## Error Handling
//!
//! - If the inner handler fails, the command is NOT marked as processed,
//!   so the next delivery attempt runs it again
//! - Store errors are returned as retryable

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::foundation::CommandEnvelope;
use crate::ports::{EnvelopeHandler, HandlerError, ProcessedCommandStore};

/// Decorates an `EnvelopeHandler` with idempotency tracking.
///
/// The inner handler's `name()` is the idempotency key.
pub struct IdempotentHandler {
    inner: Arc<dyn EnvelopeHandler>,
    processed: Arc<dyn ProcessedCommandStore>,
}

impl IdempotentHandler {
    pub fn new(inner: Arc<dyn EnvelopeHandler>, processed: Arc<dyn ProcessedCommandStore>) -> Self {
        Self { inner, processed }
    }
}

#[async_trait]
impl EnvelopeHandler for IdempotentHandler {
    async fn handle_envelope(&self, envelope: &CommandEnvelope) -> Result<(), HandlerError> {
        let handler_name = self.inner.name();

        if self
            .processed
            .contains(&envelope.command_id, handler_name)
            .await
            .map_err(HandlerError::Retryable)?
        {
            tracing::debug!(
                command_id = %envelope.command_id,
                handler = handler_name,
                "Skipping duplicate command"
            );
            return Ok(());
        }

        self.inner.handle_envelope(envelope).await?;

        self.processed
            .mark_processed(&envelope.command_id, handler_name)
            .await
            .map_err(HandlerError::Retryable)
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}
