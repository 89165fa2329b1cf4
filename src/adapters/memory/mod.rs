//! In-memory repositories for tests and local runs without a database.

mod agent_repository;
mod audit_log_repository;
mod talk_message_repository;
mod talk_repository;
mod tree_flow_repository;

pub use agent_repository::InMemoryAgentRepository;
pub use audit_log_repository::InMemoryAuditLogRepository;
pub use talk_message_repository::InMemoryTalkMessageRepository;
pub use talk_repository::InMemoryTalkRepository;
pub use tree_flow_repository::InMemoryTreeFlowRepository;
