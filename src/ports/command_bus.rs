//! Command bus ports - dispatching commands and handling them.
//!
//! Producers hand `CommandEnvelope`s to a `CommandDispatcher` without knowing
//! the transport. Consumers implement the typed `CommandHandler<C>`; the
//! registry erases the type into an `EnvelopeHandler` keyed by command type.
//!
//! Delivery is at-least-once: handlers must tolerate duplicates, either by
//! being idempotent or by running behind `IdempotentHandler`.

use async_trait::async_trait;

use crate::domain::foundation::{
    Command, CommandEnvelope, CommandId, CommandMetadata, DomainError,
};

/// Port for scheduling commands.
///
/// Returning `Ok` means the command was accepted for delivery, not that it
/// was handled.
#[async_trait]
pub trait CommandDispatcher: Send + Sync {
    async fn dispatch(&self, envelope: CommandEnvelope) -> Result<(), DomainError>;
}

/// Typed dispatch on top of any `CommandDispatcher`.
#[async_trait]
pub trait CommandDispatcherExt: CommandDispatcher {
    /// Wraps and dispatches a command, returning its id.
    async fn send<C: Command>(
        &self,
        command: &C,
        metadata: CommandMetadata,
    ) -> Result<CommandId, DomainError> {
        let envelope = command.to_envelope(metadata)?;
        let command_id = envelope.command_id;
        self.dispatch(envelope).await?;
        Ok(command_id)
    }
}

impl<T: CommandDispatcher + ?Sized> CommandDispatcherExt for T {}

/// Delivery context handed to typed handlers.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub command_id: CommandId,
    pub metadata: CommandMetadata,
    pub attempt: u32,
}

impl CommandContext {
    pub fn from_envelope(envelope: &CommandEnvelope) -> Self {
        Self {
            command_id: envelope.command_id,
            metadata: envelope.metadata.clone(),
            attempt: envelope.attempt,
        }
    }

    /// Metadata for commands dispatched while handling this one.
    pub fn child_metadata(&self) -> CommandMetadata {
        self.metadata.caused_by(&self.command_id)
    }
}

/// Handler for one command type.
///
/// # Example
///
/// ```ignore
/// #[async_trait]
/// impl CommandHandler<EvaluateStepCompletionCommand> for EvaluateStepCompletionHandler {
///     async fn handle(&self, cmd: EvaluateStepCompletionCommand, ctx: CommandContext)
///         -> Result<(), HandlerError> { /* ... */ }
///
///     fn name(&self) -> &'static str {
///         "EvaluateStepCompletionHandler"
///     }
/// }
/// ```
#[async_trait]
pub trait CommandHandler<C: Command>: Send + Sync {
    async fn handle(&self, command: C, ctx: CommandContext) -> Result<(), HandlerError>;

    /// Handler name for logging and idempotency keys.
    fn name(&self) -> &'static str;
}

/// Type-erased handler operating on envelopes.
#[async_trait]
pub trait EnvelopeHandler: Send + Sync {
    async fn handle_envelope(&self, envelope: &CommandEnvelope) -> Result<(), HandlerError>;

    fn name(&self) -> &'static str;
}

/// Outcome of a failed handler invocation, as seen by the bus.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// Transient failure; the bus should redeliver with backoff.
    #[error("retryable: {0}")]
    Retryable(#[source] DomainError),

    /// Permanent failure; redelivery cannot succeed.
    #[error("rejected: {0}")]
    Rejected(#[source] DomainError),
}

impl HandlerError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, HandlerError::Retryable(_))
    }

    pub fn domain_error(&self) -> &DomainError {
        match self {
            HandlerError::Retryable(e) | HandlerError::Rejected(e) => e,
        }
    }
}

impl From<DomainError> for HandlerError {
    /// Missing entities and validation failures are permanent; everything
    /// else is assumed transient.
    fn from(err: DomainError) -> Self {
        use crate::domain::foundation::ErrorCode;

        if err.is_not_found()
            || matches!(
                err.code,
                ErrorCode::ValidationFailed
                    | ErrorCode::InvalidFlow
                    | ErrorCode::SerializationError
            )
        {
            HandlerError::Rejected(err)
        } else {
            HandlerError::Retryable(err)
        }
    }
}
