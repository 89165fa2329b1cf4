//! Application layer - commands, their handlers and the pipeline wiring.
//!
//! Handlers orchestrate domain services over ports and talk to each other
//! only through commands on the bus.

pub mod commands;
pub mod handlers;
pub mod ingest;
pub mod pipeline;

pub use ingest::InboundMessageService;
pub use pipeline::{build_registry, PipelineDeps, PipelineSettings};
