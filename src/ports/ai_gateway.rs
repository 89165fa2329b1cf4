//! AiGateway port - Narrow contract to the AI service used by the pipeline.
//!
//! Three capabilities: pull structured answers out of a contact message,
//! write the agent's next reply, and decide whether a human should take over.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::agent::Agent;
use crate::domain::flow::Step;
use crate::domain::talk::{Talk, TalkMessage};

use super::AIError;

/// Verdict of an escalation check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationDecision {
    pub should_escalate: bool,
    #[serde(default)]
    pub reason: String,
}

impl EscalationDecision {
    pub fn escalate(reason: impl Into<String>) -> Self {
        Self {
            should_escalate: true,
            reason: reason.into(),
        }
    }

    pub fn keep_automated() -> Self {
        Self {
            should_escalate: false,
            reason: String::new(),
        }
    }
}

/// Port for the AI capabilities consumed by the command handlers.
///
/// Implementations must be safe to call concurrently for different talks.
#[async_trait]
pub trait AiGateway: Send + Sync {
    /// Extracts `{action_slug: answer}` pairs for the step's questions.
    ///
    /// Slugs that are not questions of `step` and blank answers are omitted.
    async fn extract_answers(
        &self,
        talk: &Talk,
        message: &TalkMessage,
        step: &Step,
    ) -> Result<BTreeMap<String, String>, AIError>;

    /// Writes the agent's next reply.
    ///
    /// `history` is in chronological order, oldest first. `step` is the
    /// talk's current step, when it has one.
    async fn generate_agent_response(
        &self,
        talk: &Talk,
        agent: &Agent,
        step: Option<&Step>,
        history: &[TalkMessage],
    ) -> Result<String, AIError>;

    /// Decides whether the talk should be handed to a human.
    async fn should_escalate(
        &self,
        talk: &Talk,
        message_body: &str,
    ) -> Result<EscalationDecision, AIError>;
}
