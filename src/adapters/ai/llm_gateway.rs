//! LlmAiGateway - AiGateway implemented with prompts over an AIProvider.
//!
//! The model is asked for JSON; replies are parsed leniently because models
//! wrap JSON in code fences or prose more often than not.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::domain::agent::Agent;
use crate::domain::flow::Step;
use crate::domain::talk::{Talk, TalkMessage};
use crate::ports::{
    AIError, AIProvider, AiGateway, CompletionRequest, EscalationDecision, Message,
    RequestMetadata,
};

const EXTRACTION_SYSTEM_PROMPT: &str = "You extract structured answers from a customer's chat \
message. Reply with a single JSON object mapping question slugs to the customer's answer as a \
short string. Omit questions the message does not answer. Do not add any other text.";

const ESCALATION_SYSTEM_PROMPT: &str = "You monitor automated customer conversations. Decide \
whether a human should take over: the customer asks for a person, is upset, or raises something \
an automated agent must not handle. Reply with JSON only: \
{\"should_escalate\": true|false, \"reason\": \"...\"}";

/// Tunables for the prompts sent by the gateway.
#[derive(Debug, Clone)]
pub struct LlmGatewayConfig {
    pub extraction_max_tokens: u32,
    pub escalation_max_tokens: u32,
    pub response_max_tokens: u32,
    pub response_temperature: f32,
}

impl Default for LlmGatewayConfig {
    fn default() -> Self {
        Self {
            extraction_max_tokens: 512,
            escalation_max_tokens: 200,
            response_max_tokens: 600,
            response_temperature: 0.7,
        }
    }
}

pub struct LlmAiGateway {
    provider: Arc<dyn AIProvider>,
    config: LlmGatewayConfig,
}

impl LlmAiGateway {
    pub fn new(provider: Arc<dyn AIProvider>) -> Self {
        Self {
            provider,
            config: LlmGatewayConfig::default(),
        }
    }

    pub fn with_config(mut self, config: LlmGatewayConfig) -> Self {
        self.config = config;
        self
    }

    fn metadata(talk: &Talk, purpose: &'static str) -> RequestMetadata {
        RequestMetadata::new(
            talk.id(),
            talk.organization_id(),
            purpose,
            uuid::Uuid::new_v4().to_string(),
        )
    }
}

#[async_trait]
impl AiGateway for LlmAiGateway {
    async fn extract_answers(
        &self,
        talk: &Talk,
        message: &TalkMessage,
        step: &Step,
    ) -> Result<BTreeMap<String, String>, AIError> {
        if step.questions.is_empty() || message.body().trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        let request = CompletionRequest::new(Self::metadata(talk, "extract_answers"))
            .with_system_prompt(EXTRACTION_SYSTEM_PROMPT)
            .with_message(
                crate::ports::MessageRole::User,
                extraction_prompt(step, message.body()),
            )
            .with_max_tokens(self.config.extraction_max_tokens)
            .with_temperature(0.0);

        let response = self.provider.complete(request).await?;
        let raw: BTreeMap<String, JsonValue> = parse_json_reply(&response.content)
            .ok_or_else(|| AIError::parse("Extraction reply is not a JSON object"))?;

        let answers = sanitize_answers(step, raw);
        tracing::debug!(
            talk_id = %talk.id(),
            step_slug = %step.slug,
            answers = answers.len(),
            "Extracted answers"
        );
        Ok(answers)
    }

    async fn generate_agent_response(
        &self,
        talk: &Talk,
        agent: &Agent,
        step: Option<&Step>,
        history: &[TalkMessage],
    ) -> Result<String, AIError> {
        let messages = history.iter().map(|m| {
            if m.is_inbound() {
                Message::user(m.body())
            } else {
                Message::assistant(m.body())
            }
        });

        let request = CompletionRequest::new(Self::metadata(talk, "generate_agent_response"))
            .with_system_prompt(response_system_prompt(talk, agent, step))
            .with_messages(messages)
            .with_max_tokens(self.config.response_max_tokens)
            .with_temperature(self.config.response_temperature);

        let response = self.provider.complete(request).await?;
        let reply = response.content.trim();
        if reply.is_empty() {
            return Err(AIError::parse("Model returned an empty reply"));
        }
        Ok(reply.to_string())
    }

    async fn should_escalate(
        &self,
        talk: &Talk,
        message_body: &str,
    ) -> Result<EscalationDecision, AIError> {
        let request = CompletionRequest::new(Self::metadata(talk, "should_escalate"))
            .with_system_prompt(ESCALATION_SYSTEM_PROMPT)
            .with_message(crate::ports::MessageRole::User, message_body)
            .with_max_tokens(self.config.escalation_max_tokens)
            .with_temperature(0.0);

        let response = self.provider.complete(request).await?;
        match parse_json_reply::<EscalationDecision>(&response.content) {
            Some(decision) => Ok(decision),
            None => {
                tracing::warn!(
                    talk_id = %talk.id(),
                    "Unparseable escalation reply, keeping talk automated"
                );
                Ok(EscalationDecision::keep_automated())
            }
        }
    }
}

fn extraction_prompt(step: &Step, body: &str) -> String {
    let mut prompt = String::from("Questions:\n");
    for question in &step.questions {
        let _ = writeln!(prompt, "- {}: {}", question.slug, question.text);
    }
    let _ = write!(prompt, "\nCustomer message:\n{}", body);
    prompt
}

fn response_system_prompt(talk: &Talk, agent: &Agent, step: Option<&Step>) -> String {
    let mut prompt = format!("You are {}, replying to a customer in a chat.\n", agent.name);
    if !agent.instructions.trim().is_empty() {
        let _ = writeln!(prompt, "\n{}", agent.instructions.trim());
    }

    if let Some(step) = step {
        let open: Vec<_> = step
            .questions
            .iter()
            .filter(|q| talk.flow_state().answer(&step.slug, &q.slug).is_none())
            .collect();
        if !open.is_empty() {
            prompt.push_str("\nStill to find out, one question at a time:\n");
            for question in open {
                let _ = writeln!(prompt, "- {}", question.text);
            }
        }
    }
    prompt
}

/// Keeps answers to the step's own questions, rendered as trimmed strings.
fn sanitize_answers(step: &Step, raw: BTreeMap<String, JsonValue>) -> BTreeMap<String, String> {
    raw.into_iter()
        .filter(|(slug, _)| step.question(slug).is_some())
        .filter_map(|(slug, value)| {
            let answer = match value {
                JsonValue::String(s) => s,
                JsonValue::Null => return None,
                other => other.to_string(),
            };
            let answer = answer.trim();
            (!answer.is_empty()).then(|| (slug, answer.to_string()))
        })
        .collect()
}

/// Parses a JSON reply, tolerating code fences and prose around the object.
fn parse_json_reply<T: DeserializeOwned>(content: &str) -> Option<T> {
    let stripped = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    if let Ok(value) = serde_json::from_str(stripped) {
        return Some(value);
    }

    let start = stripped.find('{')?;
    let end = stripped.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&stripped[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ai::{MockAIProvider, MockError};
    use crate::domain::flow::Question;
    use crate::domain::foundation::{OrganizationId, TalkId};

    fn step() -> Step {
        Step::new("qualify", "Qualify")
            .with_question(Question::new("name", "What is your name?"))
            .with_question(Question::new("budget", "What is your budget?"))
    }

    fn talk() -> Talk {
        Talk::new(TalkId::new(), OrganizationId::new(), None)
    }

    fn gateway(provider: &MockAIProvider) -> LlmAiGateway {
        LlmAiGateway::new(Arc::new(provider.clone()))
    }

    #[test]
    fn parses_fenced_and_wrapped_json() {
        let fenced: Option<BTreeMap<String, String>> =
            parse_json_reply("```json\n{\"name\": \"Ada\"}\n```");
        let prose: Option<BTreeMap<String, String>> =
            parse_json_reply("Sure! Here you go: {\"name\": \"Ada\"} Hope that helps.");

        assert_eq!(fenced.unwrap()["name"], "Ada");
        assert_eq!(prose.unwrap()["name"], "Ada");
        assert!(parse_json_reply::<BTreeMap<String, String>>("no json here").is_none());
    }

    #[tokio::test]
    async fn extraction_drops_unknown_slugs_and_blanks() {
        let provider = MockAIProvider::new()
            .with_response(r#"{"name": " Ada ", "budget": "", "color": "blue", "age": 42}"#);
        let talk = talk();
        let message = TalkMessage::inbound_from_contact(talk.id(), "I'm Ada");

        let answers = gateway(&provider)
            .extract_answers(&talk, &message, &step())
            .await
            .unwrap();

        assert_eq!(answers.len(), 1);
        assert_eq!(answers["name"], "Ada");
    }

    #[tokio::test]
    async fn extraction_renders_numbers_as_text() {
        let provider = MockAIProvider::new().with_response(r#"{"budget": 5000}"#);
        let talk = talk();
        let message = TalkMessage::inbound_from_contact(talk.id(), "about 5000");

        let answers = gateway(&provider)
            .extract_answers(&talk, &message, &step())
            .await
            .unwrap();

        assert_eq!(answers["budget"], "5000");
    }

    #[tokio::test]
    async fn extraction_without_questions_skips_the_model() {
        let provider = MockAIProvider::new();
        let talk = talk();
        let message = TalkMessage::inbound_from_contact(talk.id(), "hello");

        let answers = gateway(&provider)
            .extract_answers(&talk, &message, &Step::new("s", "S"))
            .await
            .unwrap();

        assert!(answers.is_empty());
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn unparseable_extraction_is_an_error() {
        let provider = MockAIProvider::new().with_response("I could not tell.");
        let talk = talk();
        let message = TalkMessage::inbound_from_contact(talk.id(), "hmm");

        let err = gateway(&provider)
            .extract_answers(&talk, &message, &step())
            .await
            .unwrap_err();

        assert!(matches!(err, AIError::Parse(_)));
    }

    #[tokio::test]
    async fn unparseable_escalation_keeps_talk_automated() {
        let provider = MockAIProvider::new().with_response("maybe?");

        let decision = gateway(&provider)
            .should_escalate(&talk(), "hello")
            .await
            .unwrap();

        assert_eq!(decision, EscalationDecision::keep_automated());
    }

    #[tokio::test]
    async fn escalation_reply_is_parsed() {
        let provider = MockAIProvider::new()
            .with_response(r#"```{"should_escalate": true, "reason": "asked for a human"}```"#);

        let decision = gateway(&provider)
            .should_escalate(&talk(), "let me talk to a person")
            .await
            .unwrap();

        assert!(decision.should_escalate);
        assert_eq!(decision.reason, "asked for a human");
    }

    #[tokio::test]
    async fn provider_errors_propagate() {
        let provider = MockAIProvider::new().with_error(MockError::Unavailable {
            message: "down".to_string(),
        });

        let err = gateway(&provider)
            .should_escalate(&talk(), "hi")
            .await
            .unwrap_err();

        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn response_prompt_lists_open_questions_and_maps_roles() {
        let provider = MockAIProvider::new().with_response("  Hi Ada! What's your budget?  ");
        let talk = talk();
        let agent = Agent::new(talk.organization_id(), "Ava", "Be warm.").unwrap();
        let history = vec![
            TalkMessage::inbound_from_contact(talk.id(), "hi"),
            TalkMessage::outbound_from_agent(talk.id(), agent.id, "Hello!"),
        ];

        let reply = gateway(&provider)
            .generate_agent_response(&talk, &agent, Some(&step()), &history)
            .await
            .unwrap();

        assert_eq!(reply, "Hi Ada! What's your budget?");
        let request = &provider.get_calls()[0];
        let system = request.system_prompt.as_deref().unwrap();
        assert!(system.contains("You are Ava"));
        assert!(system.contains("Be warm."));
        assert!(system.contains("What is your budget?"));
        assert_eq!(request.messages[0].role, crate::ports::MessageRole::User);
        assert_eq!(request.messages[1].role, crate::ports::MessageRole::Assistant);
    }
}
