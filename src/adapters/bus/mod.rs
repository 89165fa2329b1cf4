//! Command bus adapters.

mod dead_letter;
mod idempotent_handler;
mod in_memory;
mod in_memory_processed_store;
mod registry;
mod tokio_bus;

pub use dead_letter::DeadLetter;
pub use idempotent_handler::IdempotentHandler;
pub use in_memory::{DrainReport, InMemoryCommandBus};
pub use in_memory_processed_store::InMemoryProcessedCommandStore;
pub use registry::HandlerRegistry;
pub use tokio_bus::{TokioCommandBus, TokioCommandBusConfig};
