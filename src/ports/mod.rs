//! Ports - interfaces between the domain and the outside world.
//!
//! - AI: `AIProvider` (model transport), `AiGateway` (pipeline capabilities)
//! - Persistence: one repository per aggregate
//! - Messaging: `CommandDispatcher`, `CommandHandler`, `EnvelopeHandler`,
//!   `ProcessedCommandStore`

mod agent_repository;
mod ai_gateway;
mod ai_provider;
mod audit_log_repository;
mod command_bus;
mod processed_command_store;
mod talk_message_repository;
mod talk_repository;
mod tree_flow_repository;

pub use agent_repository::AgentRepository;
pub use ai_gateway::{AiGateway, EscalationDecision};
pub use ai_provider::{
    AIError, AIProvider, CompletionRequest, CompletionResponse, FinishReason, Message,
    MessageRole, ProviderInfo, RequestMetadata, TokenUsage,
};
pub use audit_log_repository::AuditLogRepository;
pub use command_bus::{
    CommandContext, CommandDispatcher, CommandDispatcherExt, CommandHandler, EnvelopeHandler,
    HandlerError,
};
pub use processed_command_store::ProcessedCommandStore;
pub use talk_message_repository::TalkMessageRepository;
pub use talk_repository::TalkRepository;
pub use tree_flow_repository::TreeFlowRepository;
