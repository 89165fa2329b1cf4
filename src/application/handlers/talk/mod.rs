//! Talk pipeline handlers.

mod evaluate_step_completion;
mod generate_agent_response;
mod process_talk_message;

pub use evaluate_step_completion::EvaluateStepCompletionHandler;
pub use generate_agent_response::{GenerateAgentResponseHandler, DEFAULT_HISTORY_WINDOW};
pub use process_talk_message::ProcessTalkMessageHandler;
