//! Flow module - the conversation graph.
//!
//! A flow is a directed graph of steps. Each step asks questions and exposes
//! inputs (completion conditions) and outputs (routing slots); outputs are
//! wired to inputs of other steps through connections.

mod definition;
mod graph;
mod step;

pub use definition::{
    ConnectionDefinition, FlowDefinition, InputDefinition, InputKind, OutputDefinition,
    QuestionDefinition, StepDefinition,
};
pub use graph::{FlowDiagnostic, FlowGraph};
pub use step::{
    Connection, Input, InputType, Output, OutputCondition, Question, Step, DEFAULT_MAX_ATTEMPTS,
};
