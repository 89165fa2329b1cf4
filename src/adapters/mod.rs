//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `ai` - Anthropic provider, LLM-backed gateway, test doubles
//! - `bus` - Command bus implementations (in-memory, Tokio workers)
//! - `flows` - YAML flow definitions on disk
//! - `memory` - In-memory repositories
//! - `postgres` - PostgreSQL repositories

pub mod ai;
pub mod bus;
pub mod flows;
pub mod memory;
pub mod postgres;

pub use bus::{
    DeadLetter, DrainReport, HandlerRegistry, IdempotentHandler, InMemoryCommandBus,
    InMemoryProcessedCommandStore, TokioCommandBus, TokioCommandBusConfig,
};
