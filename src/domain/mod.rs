//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (value objects, IDs, errors)
//! - `flow` - Flow graph of steps, inputs, outputs and connections
//! - `talk` - Talk aggregate, flow state tracking and output selection
//! - `agent` - Personas answering talks
//! - `audit` - Write-once audit records

pub mod agent;
pub mod audit;
pub mod flow;
pub mod foundation;
pub mod talk;
