//! ProcessTalkMessageHandler - entry point of the pipeline.
//!
//! Extracts answers from an inbound message, records them on the talk's
//! current step and schedules completion evaluation and the agent reply.
//! When extraction or recording fails, the talk may be handed to a human
//! before the failure goes back to the bus for a retry.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::application::commands::{
    EvaluateStepCompletionCommand, GenerateAgentResponseCommand, ProcessTalkMessageCommand,
};
use crate::application::handlers::audit::AuditTrail;
use crate::domain::flow::FlowGraph;
use crate::domain::foundation::{DomainError, TalkId};
use crate::domain::talk::{Talk, TalkFlowService, TalkMessage};
use crate::ports::{
    AiGateway, CommandContext, CommandDispatcher, CommandDispatcherExt, CommandHandler,
    HandlerError, TalkMessageRepository, TalkRepository, TreeFlowRepository,
};

/// What recording did to the talk.
struct Recorded {
    step_slug: String,
    answers: Vec<String>,
}

pub struct ProcessTalkMessageHandler {
    talks: Arc<dyn TalkRepository>,
    messages: Arc<dyn TalkMessageRepository>,
    flows: Arc<dyn TreeFlowRepository>,
    gateway: Arc<dyn AiGateway>,
    dispatcher: Arc<dyn CommandDispatcher>,
    audit: AuditTrail,
}

impl ProcessTalkMessageHandler {
    pub fn new(
        talks: Arc<dyn TalkRepository>,
        messages: Arc<dyn TalkMessageRepository>,
        flows: Arc<dyn TreeFlowRepository>,
        gateway: Arc<dyn AiGateway>,
        dispatcher: Arc<dyn CommandDispatcher>,
        audit: AuditTrail,
    ) -> Self {
        Self {
            talks,
            messages,
            flows,
            gateway,
            dispatcher,
            audit,
        }
    }

    /// Positions the talk, counts the attempt, extracts and stores answers.
    ///
    /// Returns `None` when the talk has no current step.
    async fn record_answers(
        &self,
        talk: &mut Talk,
        message: &TalkMessage,
        flow: &FlowGraph,
    ) -> Result<Option<Recorded>, DomainError> {
        let service = TalkFlowService::new(flow);
        let Some(step) = service.enter_flow(talk) else {
            return Ok(None);
        };

        service.record_attempt(talk, &step.slug, message.id())?;
        let extracted = self.gateway.extract_answers(talk, message, step).await?;

        let mut answers = Vec::with_capacity(extracted.len());
        for (action_slug, answer) in extracted {
            if answer.trim().is_empty() {
                continue;
            }
            service.record_action_answer(talk, &step.slug, &action_slug, &answer)?;
            answers.push(action_slug);
        }

        self.talks.save(talk).await?;
        Ok(Some(Recorded {
            step_slug: step.slug.clone(),
            answers,
        }))
    }

    /// Asks whether a human should take over and pauses the talk if so.
    ///
    /// Always hands the original failure back as retryable.
    async fn escalate_on_failure(
        &self,
        talk_id: TalkId,
        message: &TalkMessage,
        failure: DomainError,
        ctx: &CommandContext,
    ) -> Result<(), HandlerError> {
        tracing::error!(
            talk_id = %talk_id,
            talk_message_id = %message.id(),
            error = %failure,
            "Failed to process talk message"
        );

        // The in-flight talk may hold partial changes; pause a fresh copy.
        let talk = match self.talks.find_by_id(&talk_id).await {
            Ok(Some(talk)) => talk,
            Ok(None) => return Err(HandlerError::Retryable(failure)),
            Err(err) => {
                tracing::error!(talk_id = %talk_id, error = %err, "Failed to reload talk");
                return Err(HandlerError::Retryable(failure));
            }
        };

        let decision = match self.gateway.should_escalate(&talk, message.body()).await {
            Ok(decision) => decision,
            Err(err) => {
                tracing::warn!(talk_id = %talk_id, error = %err, "Escalation check failed");
                return Err(HandlerError::Retryable(failure));
            }
        };

        if decision.should_escalate {
            self.pause(talk, &decision.reason, ctx).await;
        }

        Err(HandlerError::Retryable(failure))
    }

    async fn pause(&self, mut talk: Talk, reason: &str, ctx: &CommandContext) {
        if let Err(err) = talk.pause(reason) {
            tracing::debug!(talk_id = %talk.id(), error = %err, "Talk not pausable");
            return;
        }
        if let Err(err) = self.talks.save(&talk).await {
            tracing::error!(talk_id = %talk.id(), error = %err, "Failed to save paused talk");
            return;
        }

        tracing::warn!(talk_id = %talk.id(), reason, "Talk paused for human takeover");
        self.audit
            .talk_event("talk.paused", &talk, json!({ "paused_reason": reason }), ctx)
            .await;
    }
}

#[async_trait]
impl CommandHandler<ProcessTalkMessageCommand> for ProcessTalkMessageHandler {
    async fn handle(
        &self,
        cmd: ProcessTalkMessageCommand,
        ctx: CommandContext,
    ) -> Result<(), HandlerError> {
        let Some(message) = self.messages.find_by_id(&cmd.talk_message_id).await? else {
            tracing::error!(talk_message_id = %cmd.talk_message_id, "Talk message not found");
            return Ok(());
        };
        let Some(mut talk) = self.talks.find_by_id(&message.talk_id()).await? else {
            tracing::error!(talk_id = %message.talk_id(), "Talk not found");
            return Ok(());
        };

        if talk.is_paused() || talk.is_completed() {
            tracing::info!(
                talk_id = %talk.id(),
                status = %talk.status(),
                "Talk not automated, skipping"
            );
            return Ok(());
        }
        let Some(flow_id) = talk.tree_flow_id() else {
            tracing::debug!(talk_id = %talk.id(), "Talk has no flow, skipping");
            return Ok(());
        };
        let Some(flow) = self.flows.find_by_id(&flow_id).await? else {
            tracing::error!(talk_id = %talk.id(), flow_id = %flow_id, "Flow not found");
            return Ok(());
        };

        let recorded = match self.record_answers(&mut talk, &message, &flow).await {
            Ok(Some(recorded)) => recorded,
            Ok(None) => {
                tracing::debug!(talk_id = %talk.id(), "Talk has no current step, skipping");
                return Ok(());
            }
            Err(err) => {
                return self
                    .escalate_on_failure(talk.id(), &message, err, &ctx)
                    .await
            }
        };

        tracing::info!(
            talk_id = %talk.id(),
            step_slug = %recorded.step_slug,
            answers = recorded.answers.len(),
            "Processed talk message"
        );
        if !recorded.answers.is_empty() {
            self.audit
                .talk_event(
                    "talk.answers_recorded",
                    &talk,
                    json!({ "step_slug": recorded.step_slug, "actions": recorded.answers }),
                    &ctx,
                )
                .await;
        }

        let metadata = ctx.child_metadata();
        self.dispatcher
            .send(
                &EvaluateStepCompletionCommand { talk_id: talk.id() },
                metadata.clone(),
            )
            .await?;
        self.dispatcher
            .send(
                &GenerateAgentResponseCommand {
                    talk_id: talk.id(),
                    context_message: Some(message.body().to_string()),
                },
                metadata,
            )
            .await?;

        Ok(())
    }

    fn name(&self) -> &'static str {
        "ProcessTalkMessageHandler"
    }
}
