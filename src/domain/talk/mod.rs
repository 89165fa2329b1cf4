//! Talk module - live conversations and their progress through a flow.

mod execution;
mod flow_service;
mod flow_state;
mod message;
#[allow(clippy::module_inception)]
mod talk;

pub use execution::{StepSelection, TreeFlowExecutionService};
pub use flow_service::TalkFlowService;
pub use flow_state::{StepTransition, TalkFlowState};
pub use message::{MessageDirection, MessageSender, TalkMessage};
pub use talk::{Talk, TalkStatus};
