//! Pipeline wiring - registers the talk and audit handlers on a registry.
//!
//! Both the worker binary and the scenario tests build the registry here, so
//! they run the same handler graph over different adapters.

use std::sync::Arc;

use crate::adapters::bus::HandlerRegistry;
use crate::domain::foundation::Command;
use crate::ports::{
    AgentRepository, AiGateway, AuditLogRepository, CommandDispatcher, CommandHandler,
    ProcessedCommandStore, TalkMessageRepository, TalkRepository, TreeFlowRepository,
};

use super::commands::{
    AuditEventMessage, EvaluateStepCompletionCommand, GenerateAgentResponseCommand,
    ProcessTalkMessageCommand,
};
use super::handlers::{
    AuditEventHandler, AuditTrail, EvaluateStepCompletionHandler, GenerateAgentResponseHandler,
    ProcessTalkMessageHandler, DEFAULT_HISTORY_WINDOW,
};

/// Ports the handlers depend on.
#[derive(Clone)]
pub struct PipelineDeps {
    pub talks: Arc<dyn TalkRepository>,
    pub messages: Arc<dyn TalkMessageRepository>,
    pub agents: Arc<dyn AgentRepository>,
    pub flows: Arc<dyn TreeFlowRepository>,
    pub audit_logs: Arc<dyn AuditLogRepository>,
    pub gateway: Arc<dyn AiGateway>,
    pub dispatcher: Arc<dyn CommandDispatcher>,
    /// When set, every handler is wrapped in an idempotency guard.
    pub processed: Option<Arc<dyn ProcessedCommandStore>>,
}

/// Tunables for the handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Messages handed to the model when generating a reply.
    pub history_window: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            history_window: DEFAULT_HISTORY_WINDOW,
        }
    }
}

/// Builds the registry with all four pipeline handlers.
pub fn build_registry(deps: PipelineDeps, settings: PipelineSettings) -> HandlerRegistry {
    let audit = AuditTrail::new(deps.dispatcher.clone());
    let mut registry = HandlerRegistry::new();

    register::<ProcessTalkMessageCommand, _>(
        &mut registry,
        &deps.processed,
        ProcessTalkMessageHandler::new(
            deps.talks.clone(),
            deps.messages.clone(),
            deps.flows.clone(),
            deps.gateway.clone(),
            deps.dispatcher.clone(),
            audit.clone(),
        ),
    );
    register::<EvaluateStepCompletionCommand, _>(
        &mut registry,
        &deps.processed,
        EvaluateStepCompletionHandler::new(
            deps.talks.clone(),
            deps.messages.clone(),
            deps.flows.clone(),
            audit.clone(),
        ),
    );
    register::<GenerateAgentResponseCommand, _>(
        &mut registry,
        &deps.processed,
        GenerateAgentResponseHandler::new(
            deps.talks.clone(),
            deps.messages.clone(),
            deps.agents.clone(),
            deps.flows.clone(),
            deps.gateway.clone(),
            audit,
        )
        .with_history_window(settings.history_window),
    );
    register::<AuditEventMessage, _>(
        &mut registry,
        &deps.processed,
        AuditEventHandler::new(deps.audit_logs),
    );

    tracing::debug!(command_types = ?registry.command_types(), "Pipeline registry built");
    registry
}

fn register<C, H>(
    registry: &mut HandlerRegistry,
    processed: &Option<Arc<dyn ProcessedCommandStore>>,
    handler: H,
) where
    C: Command,
    H: CommandHandler<C> + 'static,
{
    let handler = Arc::new(handler);
    match processed {
        Some(store) => registry.register_idempotent::<C, H>(handler, store.clone()),
        None => registry.register::<C, H>(handler),
    };
}
