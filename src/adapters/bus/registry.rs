//! HandlerRegistry - dispatch table from command type to handler.
//!
//! Typed handlers are registered per command type and stored type-erased.
//! Routing decodes the envelope payload into the handler's command type, so
//! handlers never see raw JSON.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::foundation::{Command, CommandEnvelope, DomainError, ErrorCode};
use crate::ports::{
    CommandContext, CommandHandler, EnvelopeHandler, HandlerError, ProcessedCommandStore,
};

use super::IdempotentHandler;

/// Command type → handler table shared by the buses.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<&'static str, Arc<dyn EnvelopeHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a typed handler for `C::COMMAND_TYPE`.
    ///
    /// A later registration for the same type replaces the earlier one.
    pub fn register<C, H>(&mut self, handler: Arc<H>) -> &mut Self
    where
        C: Command,
        H: CommandHandler<C> + 'static,
    {
        self.register_envelope_handler(C::COMMAND_TYPE, Arc::new(TypedHandler::new(handler)))
    }

    /// Registers a typed handler behind an idempotency guard.
    pub fn register_idempotent<C, H>(
        &mut self,
        handler: Arc<H>,
        store: Arc<dyn ProcessedCommandStore>,
    ) -> &mut Self
    where
        C: Command,
        H: CommandHandler<C> + 'static,
    {
        let typed: Arc<dyn EnvelopeHandler> = Arc::new(TypedHandler::new(handler));
        self.register_envelope_handler(
            C::COMMAND_TYPE,
            Arc::new(IdempotentHandler::new(typed, store)),
        )
    }

    /// Registers an already type-erased handler.
    pub fn register_envelope_handler(
        &mut self,
        command_type: &'static str,
        handler: Arc<dyn EnvelopeHandler>,
    ) -> &mut Self {
        if let Some(previous) = self.handlers.insert(command_type, handler) {
            tracing::warn!(
                command_type,
                replaced = previous.name(),
                "Handler registration replaced an existing handler"
            );
        }
        self
    }

    pub fn handler_for(&self, command_type: &str) -> Option<Arc<dyn EnvelopeHandler>> {
        self.handlers.get(command_type).cloned()
    }

    /// Registered command types, sorted.
    pub fn command_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.handlers.keys().copied().collect();
        types.sort_unstable();
        types
    }

    /// Hands the envelope to its handler.
    ///
    /// Unknown command types are rejected; there is nobody to retry for.
    pub async fn route(&self, envelope: &CommandEnvelope) -> Result<(), HandlerError> {
        let handler = self.handler_for(&envelope.command_type).ok_or_else(|| {
            HandlerError::Rejected(
                DomainError::new(ErrorCode::DispatchError, "No handler registered")
                    .with_detail("command_type", envelope.command_type.clone()),
            )
        })?;

        tracing::debug!(
            command_id = %envelope.command_id,
            command_type = %envelope.command_type,
            handler = handler.name(),
            attempt = envelope.attempt,
            "Routing command"
        );
        handler.handle_envelope(envelope).await
    }
}

/// Adapts a `CommandHandler<C>` to `EnvelopeHandler`.
struct TypedHandler<C, H> {
    inner: Arc<H>,
    _command: PhantomData<fn() -> C>,
}

impl<C, H> TypedHandler<C, H> {
    fn new(inner: Arc<H>) -> Self {
        Self {
            inner,
            _command: PhantomData,
        }
    }
}

#[async_trait]
impl<C, H> EnvelopeHandler for TypedHandler<C, H>
where
    C: Command,
    H: CommandHandler<C> + 'static,
{
    async fn handle_envelope(&self, envelope: &CommandEnvelope) -> Result<(), HandlerError> {
        let command: C = envelope.payload_as().map_err(|e| {
            HandlerError::Rejected(
                DomainError::new(ErrorCode::SerializationError, e.to_string())
                    .with_detail("command_type", C::COMMAND_TYPE)
                    .with_detail("command_id", envelope.command_id.to_string()),
            )
        })?;
        self.inner
            .handle(command, CommandContext::from_envelope(envelope))
            .await
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::CommandMetadata;
    use serde::{Deserialize, Serialize};
    use tokio::sync::Mutex;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Greet {
        name: String,
    }

    impl Command for Greet {
        const COMMAND_TYPE: &'static str = "test.greet.v1";
    }

    #[derive(Default)]
    struct RecordingHandler {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CommandHandler<Greet> for RecordingHandler {
        async fn handle(&self, command: Greet, _ctx: CommandContext) -> Result<(), HandlerError> {
            self.seen.lock().await.push(command.name);
            Ok(())
        }

        fn name(&self) -> &'static str {
            "RecordingHandler"
        }
    }

    #[tokio::test]
    async fn routes_decoded_command_to_handler() {
        let handler = Arc::new(RecordingHandler::default());
        let mut registry = HandlerRegistry::new();
        registry.register::<Greet, _>(handler.clone());

        let envelope = Greet {
            name: "Ana".to_string(),
        }
        .to_envelope(CommandMetadata::new())
        .unwrap();
        registry.route(&envelope).await.unwrap();

        assert_eq!(*handler.seen.lock().await, vec!["Ana".to_string()]);
        assert_eq!(registry.command_types(), vec!["test.greet.v1"]);
    }

    #[tokio::test]
    async fn unknown_command_type_is_rejected() {
        let registry = HandlerRegistry::new();
        let envelope = CommandEnvelope::new("test.unknown.v1", None, serde_json::json!({}));

        let err = registry.route(&envelope).await.unwrap_err();

        assert!(!err.is_retryable());
        assert_eq!(err.domain_error().code, ErrorCode::DispatchError);
    }

    #[tokio::test]
    async fn undecodable_payload_is_rejected() {
        let mut registry = HandlerRegistry::new();
        registry.register::<Greet, _>(Arc::new(RecordingHandler::default()));
        let envelope = CommandEnvelope::new(Greet::COMMAND_TYPE, None, serde_json::json!({"nom": 1}));

        let err = registry.route(&envelope).await.unwrap_err();

        assert_eq!(err.domain_error().code, ErrorCode::SerializationError);
    }
}
