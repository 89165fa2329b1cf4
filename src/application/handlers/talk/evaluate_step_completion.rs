//! EvaluateStepCompletionHandler - moves a talk along its flow.
//!
//! Nothing happens until the current step is complete. A complete step is
//! routed through `TreeFlowExecutionService` with the latest inbound
//! message as context; an unconnected winning output finishes the flow.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::application::commands::EvaluateStepCompletionCommand;
use crate::application::handlers::audit::AuditTrail;
use crate::domain::foundation::ErrorCode;
use crate::domain::talk::{TalkFlowService, TreeFlowExecutionService};
use crate::ports::{
    CommandContext, CommandHandler, HandlerError, TalkMessageRepository, TalkRepository,
    TreeFlowRepository,
};

pub struct EvaluateStepCompletionHandler {
    talks: Arc<dyn TalkRepository>,
    messages: Arc<dyn TalkMessageRepository>,
    flows: Arc<dyn TreeFlowRepository>,
    audit: AuditTrail,
}

impl EvaluateStepCompletionHandler {
    pub fn new(
        talks: Arc<dyn TalkRepository>,
        messages: Arc<dyn TalkMessageRepository>,
        flows: Arc<dyn TreeFlowRepository>,
        audit: AuditTrail,
    ) -> Self {
        Self {
            talks,
            messages,
            flows,
            audit,
        }
    }
}

#[async_trait]
impl CommandHandler<EvaluateStepCompletionCommand> for EvaluateStepCompletionHandler {
    async fn handle(
        &self,
        cmd: EvaluateStepCompletionCommand,
        ctx: CommandContext,
    ) -> Result<(), HandlerError> {
        let Some(mut talk) = self.talks.find_by_id(&cmd.talk_id).await? else {
            tracing::error!(talk_id = %cmd.talk_id, "Talk not found");
            return Ok(());
        };
        if talk.is_completed() {
            tracing::debug!(talk_id = %talk.id(), "Talk already completed");
            return Ok(());
        }
        let Some(flow_id) = talk.tree_flow_id() else {
            tracing::debug!(talk_id = %talk.id(), "Talk has no flow");
            return Ok(());
        };
        let Some(flow) = self.flows.find_by_id(&flow_id).await? else {
            tracing::error!(talk_id = %talk.id(), flow_id = %flow_id, "Flow not found");
            return Ok(());
        };

        let service = TalkFlowService::new(&flow);
        let Some(step) = service.get_current_step(&talk) else {
            tracing::error!(
                talk_id = %talk.id(),
                step_slug = ?talk.flow_state().current_step_slug(),
                "Current step not found"
            );
            return Ok(());
        };
        if !service.is_step_complete(&talk, &step.slug) {
            tracing::debug!(talk_id = %talk.id(), step_slug = %step.slug, "Step not complete yet");
            return Ok(());
        }

        let latest_body = self
            .messages
            .latest_inbound(&talk.id())
            .await?
            .map(|m| m.body().to_string())
            .unwrap_or_default();

        let selection = match TreeFlowExecutionService::new(&flow)
            .evaluate_and_select_next_step(&talk, &latest_body)
        {
            Ok(selection) => selection,
            Err(err) if err.code == ErrorCode::NoMatchingOutput => {
                tracing::debug!(
                    talk_id = %talk.id(),
                    step_slug = %step.slug,
                    "No output condition holds, waiting for more input"
                );
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        service.complete_step(
            &mut talk,
            &selection.step_slug,
            selection.output_slug.as_deref(),
            selection.next_step_slug.as_deref(),
        )?;
        self.talks.save(&talk).await?;

        tracing::info!(
            talk_id = %talk.id(),
            from = %selection.step_slug,
            output = ?selection.output_slug,
            to = ?selection.next_step_slug,
            "Step completed"
        );
        self.audit
            .talk_event(
                "talk.step_completed",
                &talk,
                json!({
                    "step_slug": selection.step_slug,
                    "output_slug": selection.output_slug,
                    "next_step_slug": selection.next_step_slug,
                }),
                &ctx,
            )
            .await;
        if selection.is_terminal() {
            self.audit
                .talk_event(
                    "talk.flow_finished",
                    &talk,
                    json!({ "last_step_slug": selection.step_slug }),
                    &ctx,
                )
                .await;
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "EvaluateStepCompletionHandler"
    }
}
