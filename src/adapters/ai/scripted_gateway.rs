//! ScriptedAiGateway - deterministic AiGateway for pipeline tests.
//!
//! Extraction results and replies are queued up front and consumed in call
//! order. Every call is recorded so tests can assert on what the handlers
//! asked for.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::domain::agent::Agent;
use crate::domain::flow::Step;
use crate::domain::foundation::{AgentId, TalkId};
use crate::domain::talk::{Talk, TalkMessage};
use crate::ports::{AIError, AiGateway, EscalationDecision};

use super::MockError;

/// One recorded gateway call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    ExtractAnswers { talk_id: TalkId, step_slug: String },
    GenerateResponse {
        talk_id: TalkId,
        agent_id: AgentId,
        step_slug: Option<String>,
        history_len: usize,
    },
    ShouldEscalate { talk_id: TalkId },
}

#[derive(Debug, Clone)]
enum Scripted<T> {
    Ok(T),
    Fail(MockError),
}

#[derive(Debug)]
pub struct ScriptedAiGateway {
    extractions: Mutex<VecDeque<Scripted<BTreeMap<String, String>>>>,
    replies: Mutex<VecDeque<Scripted<String>>>,
    default_reply: String,
    escalation: EscalationDecision,
    calls: Mutex<Vec<GatewayCall>>,
}

impl Default for ScriptedAiGateway {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ScriptedAiGateway {
    /// Extracts nothing, replies with a fixed text, never escalates.
    pub fn new() -> Self {
        Self {
            extractions: Mutex::new(VecDeque::new()),
            replies: Mutex::new(VecDeque::new()),
            default_reply: "Thanks for your message!".to_string(),
            escalation: EscalationDecision::keep_automated(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queues the answers returned by the next extraction.
    pub fn with_extraction<'a>(self, answers: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let answers = answers
            .into_iter()
            .map(|(slug, answer)| (slug.to_string(), answer.to_string()))
            .collect();
        lock(&self.extractions).push_back(Scripted::Ok(answers));
        self
    }

    /// Makes the next extraction fail.
    pub fn with_extraction_failure(self, error: MockError) -> Self {
        lock(&self.extractions).push_back(Scripted::Fail(error));
        self
    }

    /// Queues the next reply.
    pub fn with_reply(self, reply: impl Into<String>) -> Self {
        lock(&self.replies).push_back(Scripted::Ok(reply.into()));
        self
    }

    /// Makes the next reply generation fail.
    pub fn with_reply_failure(self, error: MockError) -> Self {
        lock(&self.replies).push_back(Scripted::Fail(error));
        self
    }

    pub fn with_default_reply(mut self, reply: impl Into<String>) -> Self {
        self.default_reply = reply.into();
        self
    }

    /// Decision returned by every escalation check.
    pub fn with_escalation(mut self, decision: EscalationDecision) -> Self {
        self.escalation = decision;
        self
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        lock(&self.calls).clone()
    }

    pub fn escalation_checks(&self) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| matches!(c, GatewayCall::ShouldEscalate { .. }))
            .count()
    }

    fn record(&self, call: GatewayCall) {
        lock(&self.calls).push(call);
    }
}

#[async_trait]
impl AiGateway for ScriptedAiGateway {
    async fn extract_answers(
        &self,
        talk: &Talk,
        _message: &TalkMessage,
        step: &Step,
    ) -> Result<BTreeMap<String, String>, AIError> {
        self.record(GatewayCall::ExtractAnswers {
            talk_id: talk.id(),
            step_slug: step.slug.clone(),
        });

        match lock(&self.extractions).pop_front() {
            Some(Scripted::Ok(answers)) => Ok(answers
                .into_iter()
                .filter(|(slug, answer)| step.question(slug).is_some() && !answer.trim().is_empty())
                .collect()),
            Some(Scripted::Fail(error)) => Err(error.into()),
            None => Ok(BTreeMap::new()),
        }
    }

    async fn generate_agent_response(
        &self,
        talk: &Talk,
        agent: &Agent,
        step: Option<&Step>,
        history: &[TalkMessage],
    ) -> Result<String, AIError> {
        self.record(GatewayCall::GenerateResponse {
            talk_id: talk.id(),
            agent_id: agent.id,
            step_slug: step.map(|s| s.slug.clone()),
            history_len: history.len(),
        });

        match lock(&self.replies).pop_front() {
            Some(Scripted::Ok(reply)) => Ok(reply),
            Some(Scripted::Fail(error)) => Err(error.into()),
            None => Ok(self.default_reply.clone()),
        }
    }

    async fn should_escalate(
        &self,
        talk: &Talk,
        _message_body: &str,
    ) -> Result<EscalationDecision, AIError> {
        self.record(GatewayCall::ShouldEscalate { talk_id: talk.id() });
        Ok(self.escalation.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::flow::Question;
    use crate::domain::foundation::OrganizationId;

    #[tokio::test]
    async fn extractions_are_consumed_in_order_and_filtered() {
        let gateway = ScriptedAiGateway::new()
            .with_extraction([("name", "Ada"), ("unknown", "x")])
            .with_extraction_failure(MockError::Network {
                message: "reset".to_string(),
            });
        let talk = Talk::new(TalkId::new(), OrganizationId::new(), None);
        let message = TalkMessage::inbound_from_contact(talk.id(), "hi");
        let step = Step::new("s", "S").with_question(Question::new("name", "Name?"));

        let first = gateway.extract_answers(&talk, &message, &step).await.unwrap();
        let second = gateway.extract_answers(&talk, &message, &step).await;
        let third = gateway.extract_answers(&talk, &message, &step).await.unwrap();

        assert_eq!(first.len(), 1);
        assert!(second.is_err());
        assert!(third.is_empty());
        assert_eq!(gateway.calls().len(), 3);
    }

    #[tokio::test]
    async fn replies_fall_back_to_default() {
        let gateway = ScriptedAiGateway::new()
            .with_reply("first")
            .with_default_reply("later");
        let talk = Talk::new(TalkId::new(), OrganizationId::new(), None);
        let agent = Agent::new(talk.organization_id(), "Ava", "").unwrap();

        let a = gateway.generate_agent_response(&talk, &agent, None, &[]).await.unwrap();
        let b = gateway.generate_agent_response(&talk, &agent, None, &[]).await.unwrap();

        assert_eq!((a.as_str(), b.as_str()), ("first", "later"));
    }
}
