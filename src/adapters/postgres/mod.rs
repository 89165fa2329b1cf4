//! PostgreSQL adapters - Database implementations for repository ports.
//!
//! This module provides adapters for PostgreSQL-backed persistence:
//! - `PostgresTalkRepository` - Talks with their flow state as JSONB
//! - `PostgresTalkMessageRepository` - Append-only chat history
//! - `PostgresAgentRepository` - Agents and availability lookup
//! - `PostgresAuditLogRepository` - Write-once audit rows
//! - `PostgresProcessedCommandStore` - Idempotency records for the command bus
//!
//! Queries are checked at runtime; the schema lives in `migrations/`.

mod agent_repository;
mod audit_log_repository;
mod processed_command_store;
mod row;
mod talk_message_repository;
mod talk_repository;

pub use agent_repository::PostgresAgentRepository;
pub use audit_log_repository::PostgresAuditLogRepository;
pub use processed_command_store::PostgresProcessedCommandStore;
pub use talk_message_repository::PostgresTalkMessageRepository;
pub use talk_repository::PostgresTalkRepository;
