//! End-to-end pipeline scenarios over the in-memory command bus.
//!
//! Every test wires the real handlers with `build_registry`, feeds one
//! inbound message through `InboundMessageService` and drains the bus.

use std::sync::Arc;

use talkflow::adapters::ai::{GatewayCall, MockError, ScriptedAiGateway};
use talkflow::adapters::bus::{InMemoryCommandBus, InMemoryProcessedCommandStore};
use talkflow::adapters::memory::{
    InMemoryAgentRepository, InMemoryAuditLogRepository, InMemoryTalkMessageRepository,
    InMemoryTalkRepository, InMemoryTreeFlowRepository,
};
use talkflow::adapters::HandlerRegistry;
use talkflow::application::commands::{
    EvaluateStepCompletionCommand, GenerateAgentResponseCommand, ProcessTalkMessageCommand,
};
use talkflow::application::{build_registry, InboundMessageService, PipelineDeps, PipelineSettings};
use talkflow::domain::agent::Agent;
use talkflow::domain::flow::{Connection, FlowGraph, Input, InputType, Output, Question, Step};
use talkflow::domain::foundation::{
    Command, CommandMetadata, OrganizationId, TalkId, TreeFlowId,
};
use talkflow::domain::talk::{MessageDirection, Talk, TalkStatus};
use talkflow::ports::{
    AgentRepository, CommandDispatcher, CommandDispatcherExt, EscalationDecision,
    ProcessedCommandStore, TalkRepository,
};

struct Harness {
    talks: InMemoryTalkRepository,
    messages: InMemoryTalkMessageRepository,
    agents: InMemoryAgentRepository,
    flows: InMemoryTreeFlowRepository,
    audit_logs: InMemoryAuditLogRepository,
    gateway: Arc<ScriptedAiGateway>,
    bus: Arc<InMemoryCommandBus>,
    registry: HandlerRegistry,
    organization_id: OrganizationId,
}

impl Harness {
    fn new(gateway: ScriptedAiGateway) -> Self {
        Self::build(gateway, None)
    }

    fn idempotent(gateway: ScriptedAiGateway) -> Self {
        Self::build(gateway, Some(Arc::new(InMemoryProcessedCommandStore::new())))
    }

    fn build(gateway: ScriptedAiGateway, processed: Option<Arc<dyn ProcessedCommandStore>>) -> Self {
        let talks = InMemoryTalkRepository::new();
        let messages = InMemoryTalkMessageRepository::new();
        let agents = InMemoryAgentRepository::new();
        let flows = InMemoryTreeFlowRepository::new();
        let audit_logs = InMemoryAuditLogRepository::new();
        let gateway = Arc::new(gateway);
        let bus = Arc::new(InMemoryCommandBus::new());

        let registry = build_registry(
            PipelineDeps {
                talks: Arc::new(talks.clone()),
                messages: Arc::new(messages.clone()),
                agents: Arc::new(agents.clone()),
                flows: Arc::new(flows.clone()),
                audit_logs: Arc::new(audit_logs.clone()),
                gateway: gateway.clone(),
                dispatcher: bus.clone(),
                processed,
            },
            PipelineSettings::default(),
        );

        Self {
            talks,
            messages,
            agents,
            flows,
            audit_logs,
            gateway,
            bus,
            registry,
            organization_id: OrganizationId::new(),
        }
    }

    /// Saves the flow, an available agent and an active talk bound to it.
    async fn open_talk(&self, flow: FlowGraph) -> Talk {
        let flow = self.flows.insert(flow).await;
        let agent = Agent::new(self.organization_id, "Ava", "Friendly and brief.").unwrap();
        self.agents.save(&agent).await.unwrap();

        let talk = Talk::new(TalkId::new(), self.organization_id, Some(flow.id()));
        self.talks.save(&talk).await.unwrap();
        talk
    }

    async fn send(&self, talk: &Talk, body: &str) {
        InboundMessageService::new(
            Arc::new(self.talks.clone()),
            Arc::new(self.messages.clone()),
            self.bus.clone(),
        )
        .receive(talk.id(), body, CommandMetadata::new().with_source("test"))
        .await
        .unwrap();
    }

    async fn reload(&self, talk: &Talk) -> Talk {
        self.talks.find_by_id(&talk.id()).await.unwrap().unwrap()
    }
}

/// step1(first, asks name, output o1) --> step2(input i1, asks email)
fn two_step_flow() -> FlowGraph {
    let step1 = Step::new("step1", "Step 1")
        .as_first()
        .with_question(Question::new("name", "What is your name?"))
        .with_output(Output::new("o1", "Next"));
    let step2 = Step::new("step2", "Step 2")
        .with_question(Question::new("email", "What is your email?"))
        .with_input(Input::new("i1", "From step 1", InputType::Any));
    let edge = Connection::new(step1.outputs[0].id, step2.inputs[0].id);

    FlowGraph::new(TreeFlowId::new(), "Two steps", vec![step1, step2], vec![edge]).unwrap()
}

/// step1(first, asks name, gives up after 2 messages, output o1) --> step2
fn patient_flow() -> FlowGraph {
    let step1 = Step::new("step1", "Step 1")
        .as_first()
        .with_question(Question::new("name", "What is your name?"))
        .with_input(Input::new(
            "give_up",
            "Give up",
            InputType::NotCompletedAfterAttempts { max_attempts: 2 },
        ))
        .with_output(Output::new("o1", "Next"));
    let step2 = Step::new("step2", "Step 2")
        .with_question(Question::new("email", "What is your email?"))
        .with_input(Input::new("i1", "From step 1", InputType::Any));
    let edge = Connection::new(step1.outputs[0].id, step2.inputs[0].id);

    FlowGraph::new(TreeFlowId::new(), "Patient", vec![step1, step2], vec![edge]).unwrap()
}

/// step1(first, asks name, output o1 without connection)
fn single_step_flow() -> FlowGraph {
    let step1 = Step::new("step1", "Step 1")
        .as_first()
        .with_question(Question::new("name", "What is your name?"))
        .with_output(Output::new("o1", "Done"));

    FlowGraph::new(TreeFlowId::new(), "One step", vec![step1], vec![]).unwrap()
}

#[tokio::test]
async fn completed_step_advances_to_connected_step() {
    let h = Harness::new(
        ScriptedAiGateway::new()
            .with_extraction([("name", "Ada")])
            .with_reply("Nice to meet you, Ada! What's your email?"),
    );
    let talk = h.open_talk(two_step_flow()).await;
    assert_eq!(talk.flow_state().current_step_slug(), None);

    h.send(&talk, "Hi, I'm Ada").await;
    let report = h.bus.run_until_idle(&h.registry).await;

    assert_eq!(report.dead_lettered, 0);
    let talk = h.reload(&talk).await;
    assert_eq!(talk.flow_state().current_step_slug(), Some("step2"));
    assert_eq!(talk.flow_state().answer("step1", "name"), Some("Ada"));
    assert_eq!(talk.status(), TalkStatus::Active);
    assert!(talk.agent_id().is_some());
    assert_eq!(talk.message_count(), 2);

    let history = h.messages.all_for_talk(&talk.id()).await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].direction(), MessageDirection::Outbound);
    assert_eq!(history[1].body(), "Nice to meet you, Ada! What's your email?");

    // The reply is generated after the transition, for the new step.
    assert!(h.gateway.calls().iter().any(|call| matches!(
        call,
        GatewayCall::GenerateResponse { step_slug: Some(slug), history_len: 1, .. } if slug == "step2"
    )));
}

#[tokio::test]
async fn unconnected_output_completes_talk_without_reply() {
    let h = Harness::new(ScriptedAiGateway::new().with_extraction([("name", "Ada")]));
    let talk = h.open_talk(single_step_flow()).await;

    h.send(&talk, "I'm Ada").await;
    h.bus.run_until_idle(&h.registry).await;

    let talk = h.reload(&talk).await;
    assert_eq!(talk.status(), TalkStatus::Completed);
    assert!(talk.closed_at().is_some());
    assert!(talk.flow_state().is_finished());

    let transitions = talk.flow_state().transitions();
    assert_eq!(transitions.len(), 1);
    assert_eq!(transitions[0].output_slug.as_deref(), Some("o1"));
    assert_eq!(transitions[0].next_step_slug, None);

    let history = h.messages.all_for_talk(&talk.id()).await;
    assert_eq!(history.len(), 1);
    assert!(history[0].is_inbound());
    assert!(!h
        .gateway
        .calls()
        .iter()
        .any(|call| matches!(call, GatewayCall::GenerateResponse { .. })));
}

#[tokio::test]
async fn failed_recording_pauses_talk_when_escalation_is_advised() {
    let h = Harness::new(
        ScriptedAiGateway::new()
            .with_extraction_failure(MockError::Unavailable {
                message: "model overloaded".to_string(),
            })
            .with_escalation(EscalationDecision::escalate("contains profanity")),
    );
    let talk = h.open_talk(two_step_flow()).await;

    h.send(&talk, "some rude words").await;
    let report = h.bus.run_until_idle(&h.registry).await;

    // First attempt fails and is retried; the retry finds the talk paused.
    assert_eq!(report.retried, 1);
    assert_eq!(report.dead_lettered, 0);

    let talk = h.reload(&talk).await;
    assert_eq!(talk.status(), TalkStatus::Paused);
    assert!(talk.paused_reason().unwrap().contains("contains profanity"));
    assert!(talk.paused_at().is_some());
    assert_eq!(h.gateway.escalation_checks(), 1);
    assert!(h
        .bus
        .dispatched_of_type("talk.generate_agent_response.v1")
        .await
        .is_empty());
    assert_eq!(h.audit_logs.actions().await, vec!["talk.paused"]);
}

#[tokio::test]
async fn lifecycle_events_reach_the_audit_log() {
    let h = Harness::new(ScriptedAiGateway::new().with_extraction([("name", "Ada")]));
    let talk = h.open_talk(two_step_flow()).await;

    h.send(&talk, "Hi, I'm Ada").await;
    h.bus.run_until_idle(&h.registry).await;

    assert_eq!(
        h.audit_logs.actions().await,
        vec![
            "talk.answers_recorded",
            "talk.step_completed",
            "talk.agent_assigned",
            "talk_message.sent",
        ]
    );
    let logs = h.audit_logs.all().await;
    assert_eq!(logs[0].entity_class, "Talk");
    assert_eq!(logs[0].entity_id, Some(*talk.id().as_uuid()));
    assert_eq!(logs[3].entity_class, "TalkMessage");
}

#[tokio::test]
async fn paused_talk_is_left_alone() {
    let h = Harness::new(ScriptedAiGateway::new().with_extraction([("name", "Ada")]));
    let mut talk = h.open_talk(two_step_flow()).await;
    talk.pause("handled by a human").unwrap();
    h.talks.save(&talk).await.unwrap();

    h.send(&talk, "Hi, I'm Ada").await;
    let report = h.bus.run_until_idle(&h.registry).await;

    assert_eq!(report.handled, 1);
    assert!(h.gateway.calls().is_empty());
    assert_eq!(h.reload(&talk).await.flow_state().current_step_slug(), None);
}

#[tokio::test]
async fn redelivered_command_is_processed_once() {
    let h = Harness::idempotent(ScriptedAiGateway::new());
    let talk = h.open_talk(two_step_flow()).await;

    h.send(&talk, "hello").await;
    let envelope = h
        .bus
        .dispatched_of_type(ProcessTalkMessageCommand::COMMAND_TYPE)
        .await
        .remove(0);
    h.bus.dispatch(envelope).await.unwrap();
    h.bus.run_until_idle(&h.registry).await;

    let talk = h.reload(&talk).await;
    assert_eq!(talk.flow_state().attempts_for("step1"), 1);
    let extractions = h
        .gateway
        .calls()
        .into_iter()
        .filter(|call| matches!(call, GatewayCall::ExtractAnswers { .. }))
        .count();
    assert_eq!(extractions, 1);
}

#[tokio::test]
async fn message_retried_after_failed_dispatch_counts_as_one_attempt() {
    let h = Harness::new(ScriptedAiGateway::new());
    let talk = h.open_talk(patient_flow()).await;
    h.bus
        .fail_next_dispatch_of(GenerateAgentResponseCommand::COMMAND_TYPE)
        .await;

    h.send(&talk, "hmm, let me think").await;
    let report = h.bus.run_until_idle(&h.registry).await;

    assert_eq!(report.retried, 1);
    assert_eq!(report.dead_lettered, 0);
    let talk = h.reload(&talk).await;
    // Counting the message twice would have hit the give-up threshold.
    assert_eq!(talk.flow_state().attempts_for("step1"), 1);
    assert_eq!(talk.flow_state().current_step_slug(), Some("step1"));

    let outbound = h
        .messages
        .all_for_talk(&talk.id())
        .await
        .into_iter()
        .filter(|m| !m.is_inbound())
        .count();
    assert_eq!(outbound, 1);
    assert_eq!(talk.message_count(), 2);
}

#[tokio::test]
async fn replayed_reply_after_failed_talk_save_is_not_sent_twice() {
    let h = Harness::new(ScriptedAiGateway::new().with_extraction([("name", "Ada")]));
    let talk = h.open_talk(two_step_flow()).await;
    h.send(&talk, "Hi, I'm Ada").await;
    h.bus.run_until_idle(&h.registry).await;
    assert_eq!(h.reload(&talk).await.message_count(), 2);

    h.talks.fail_saves(true);
    h.bus
        .send(
            &GenerateAgentResponseCommand {
                talk_id: talk.id(),
                context_message: None,
            },
            CommandMetadata::new().with_source("test"),
        )
        .await
        .unwrap();
    let report = h.bus.run_until_idle(&h.registry).await;
    assert_eq!(report.dead_lettered, 1);

    h.talks.fail_saves(false);
    let dead = h.bus.dead_letters().await.remove(0);
    h.bus.dispatch(dead.envelope).await.unwrap();
    let report = h.bus.run_until_idle(&h.registry).await;
    assert_eq!(report.dead_lettered, 0);

    let talk = h.reload(&talk).await;
    let outbound = h
        .messages
        .all_for_talk(&talk.id())
        .await
        .into_iter()
        .filter(|m| !m.is_inbound())
        .count();
    assert_eq!(outbound, 2);
    assert_eq!(talk.message_count(), 3);
    let generated = h
        .gateway
        .calls()
        .into_iter()
        .filter(|call| matches!(call, GatewayCall::GenerateResponse { .. }))
        .count();
    assert_eq!(generated, 2);
}

#[tokio::test]
async fn redelivered_evaluation_does_not_advance_twice() {
    let h = Harness::new(ScriptedAiGateway::new().with_extraction([("name", "Ada")]));
    let talk = h.open_talk(two_step_flow()).await;
    h.send(&talk, "Hi, I'm Ada").await;
    h.bus.run_until_idle(&h.registry).await;

    let evaluation = h
        .bus
        .dispatched_of_type(EvaluateStepCompletionCommand::COMMAND_TYPE)
        .await
        .remove(0);
    h.bus.dispatch(evaluation).await.unwrap();
    let report = h.bus.run_until_idle(&h.registry).await;

    assert_eq!(report.dead_lettered, 0);
    let talk = h.reload(&talk).await;
    assert_eq!(talk.flow_state().current_step_slug(), Some("step2"));
    assert_eq!(talk.flow_state().transitions().len(), 1);
}

