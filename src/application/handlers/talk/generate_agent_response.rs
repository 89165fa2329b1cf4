//! GenerateAgentResponseHandler - writes the agent's next message.
//!
//! Finishes talks whose flow has ended instead of replying. Otherwise an
//! agent is resolved (and assigned on first use), the recent history is
//! handed to the AI gateway and the reply is stored as an outbound message.
//!
//! The reply's id is the command id. A redelivered command whose reply is
//! already stored only finishes the bookkeeping instead of replying twice.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::application::commands::GenerateAgentResponseCommand;
use crate::application::handlers::audit::AuditTrail;
use crate::domain::agent::Agent;
use crate::domain::flow::FlowGraph;
use crate::domain::foundation::{DomainError, TalkMessageId};
use crate::domain::talk::{MessageSender, Talk, TalkFlowService, TalkMessage};
use crate::ports::{
    AgentRepository, AiGateway, CommandContext, CommandHandler, HandlerError,
    TalkMessageRepository, TalkRepository, TreeFlowRepository,
};

/// Messages of history handed to the gateway.
pub const DEFAULT_HISTORY_WINDOW: usize = 10;

pub struct GenerateAgentResponseHandler {
    talks: Arc<dyn TalkRepository>,
    messages: Arc<dyn TalkMessageRepository>,
    agents: Arc<dyn AgentRepository>,
    flows: Arc<dyn TreeFlowRepository>,
    gateway: Arc<dyn AiGateway>,
    audit: AuditTrail,
    history_window: usize,
}

impl GenerateAgentResponseHandler {
    pub fn new(
        talks: Arc<dyn TalkRepository>,
        messages: Arc<dyn TalkMessageRepository>,
        agents: Arc<dyn AgentRepository>,
        flows: Arc<dyn TreeFlowRepository>,
        gateway: Arc<dyn AiGateway>,
        audit: AuditTrail,
    ) -> Self {
        Self {
            talks,
            messages,
            agents,
            flows,
            gateway,
            audit,
            history_window: DEFAULT_HISTORY_WINDOW,
        }
    }

    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window.max(1);
        self
    }

    async fn load_flow(&self, talk: &Talk) -> Result<Option<Arc<FlowGraph>>, DomainError> {
        match talk.tree_flow_id() {
            Some(flow_id) => self.flows.find_by_id(&flow_id).await,
            None => Ok(None),
        }
    }

    /// The assigned agent if it is still active, else the first available
    /// agent of the organization, which then gets assigned.
    async fn resolve_agent(
        &self,
        talk: &mut Talk,
        ctx: &CommandContext,
    ) -> Result<Option<Agent>, DomainError> {
        if let Some(agent_id) = talk.agent_id() {
            match self.agents.find_by_id(&agent_id).await? {
                Some(agent) if agent.active => return Ok(Some(agent)),
                _ => tracing::warn!(
                    talk_id = %talk.id(),
                    agent_id = %agent_id,
                    "Assigned agent unusable, picking another"
                ),
            }
        }

        let candidates = self
            .agents
            .find_available_in_organization(&talk.organization_id())
            .await?;
        let Some(agent) = candidates.into_iter().find(Agent::can_take_talks) else {
            return Ok(None);
        };

        talk.assign_agent(agent.id);
        self.talks.save(talk).await?;
        tracing::info!(talk_id = %talk.id(), agent_id = %agent.id, "Agent assigned");
        self.audit
            .talk_event(
                "talk.agent_assigned",
                talk,
                json!({ "agent_id": agent.id.to_string() }),
                ctx,
            )
            .await;
        Ok(Some(agent))
    }

    /// Counts a stored reply on the talk and publishes it.
    async fn record_reply(
        &self,
        talk: &mut Talk,
        message: &TalkMessage,
        ctx: &CommandContext,
    ) -> Result<(), DomainError> {
        talk.record_message(message.sent_at());
        self.talks.save(talk).await?;

        let agent_id = match message.sender() {
            MessageSender::Agent(agent_id) => agent_id.to_string(),
            _ => String::new(),
        };
        self.audit
            .message_event(
                "talk_message.sent",
                message,
                json!({ "talk_id": talk.id().to_string(), "agent_id": agent_id }),
                ctx,
            )
            .await;
        Ok(())
    }

    async fn complete_talk(&self, mut talk: Talk, ctx: &CommandContext) -> Result<(), HandlerError> {
        talk.complete()?;
        self.talks.save(&talk).await?;

        tracing::info!(talk_id = %talk.id(), "Flow finished, talk completed");
        self.audit
            .talk_event(
                "talk.completed",
                &talk,
                json!({ "closed_at": talk.closed_at() }),
                ctx,
            )
            .await;
        Ok(())
    }
}

#[async_trait]
impl CommandHandler<GenerateAgentResponseCommand> for GenerateAgentResponseHandler {
    async fn handle(
        &self,
        cmd: GenerateAgentResponseCommand,
        ctx: CommandContext,
    ) -> Result<(), HandlerError> {
        let Some(mut talk) = self.talks.find_by_id(&cmd.talk_id).await? else {
            tracing::error!(talk_id = %cmd.talk_id, "Talk not found");
            return Ok(());
        };
        if talk.is_paused() || talk.is_completed() {
            tracing::info!(
                talk_id = %talk.id(),
                status = %talk.status(),
                "Talk not automated, no response"
            );
            return Ok(());
        }

        let reply_id = TalkMessageId::from_uuid(*ctx.command_id.as_uuid());
        if let Some(stored) = self.messages.find_by_id(&reply_id).await? {
            // An earlier attempt stored the reply; count it unless that landed too.
            let counted = talk
                .date_last_message()
                .is_some_and(|last| !stored.sent_at().is_after(&last));
            if !counted {
                self.record_reply(&mut talk, &stored, &ctx).await?;
            }
            tracing::info!(
                talk_id = %talk.id(),
                talk_message_id = %reply_id,
                "Reply already stored, not generating again"
            );
            return Ok(());
        }

        let flow = self.load_flow(&talk).await?;
        if let Some(flow) = flow.as_deref() {
            if TalkFlowService::new(flow).is_flow_complete(&talk) {
                return self.complete_talk(talk, &ctx).await;
            }
        }

        let Some(agent) = self.resolve_agent(&mut talk, &ctx).await? else {
            tracing::error!(
                talk_id = %talk.id(),
                organization_id = %talk.organization_id(),
                "No available agent, response not generated"
            );
            return Ok(());
        };

        let step = flow
            .as_deref()
            .and_then(|flow| TalkFlowService::new(flow).get_current_step(&talk));

        let mut history = self
            .messages
            .recent_for_talk(&talk.id(), self.history_window)
            .await?;
        if history.is_empty() {
            if let Some(context) = cmd.context_message.as_deref() {
                history.push(TalkMessage::inbound_from_contact(talk.id(), context));
            }
        }

        let reply = self
            .gateway
            .generate_agent_response(&talk, &agent, step, &history)
            .await
            .map_err(DomainError::from)?;

        let message = TalkMessage::outbound_from_agent(talk.id(), agent.id, reply).with_id(reply_id);
        self.messages.save(&message).await?;
        self.record_reply(&mut talk, &message, &ctx).await?;

        tracing::info!(
            talk_id = %talk.id(),
            agent_id = %agent.id,
            talk_message_id = %message.id(),
            step_slug = ?step.map(|s| s.slug.as_str()),
            "Agent response sent"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "GenerateAgentResponseHandler"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ai::{GatewayCall, MockError, ScriptedAiGateway};
    use crate::application::handlers::talk::test_support::{ctx, Fixture};
    use crate::domain::talk::{MessageDirection, TalkStatus};

    fn handler(
        fx: &Fixture,
        gateway: ScriptedAiGateway,
    ) -> (GenerateAgentResponseHandler, Arc<ScriptedAiGateway>) {
        let gateway = Arc::new(gateway);
        let handler = GenerateAgentResponseHandler::new(
            Arc::new(fx.talks.clone()),
            Arc::new(fx.messages.clone()),
            Arc::new(fx.agents.clone()),
            Arc::new(fx.flows.clone()),
            gateway.clone(),
            fx.audit(),
        );
        (handler, gateway)
    }

    fn command(talk: &Talk) -> GenerateAgentResponseCommand {
        GenerateAgentResponseCommand {
            talk_id: talk.id(),
            context_message: None,
        }
    }

    #[tokio::test]
    async fn reply_is_persisted_and_counted() {
        let fx = Fixture::new().await;
        let talk = fx.talk_on_step("qualify", &[]).await;
        let agent = fx.agent(&talk).await;
        fx.inbound(&talk, "hi").await;
        let (handler, gateway) = handler(&fx, ScriptedAiGateway::new().with_reply("What's your name?"));

        handler.handle(command(&talk), ctx()).await.unwrap();

        let messages = fx.messages.all_for_talk(&talk.id()).await;
        let outbound: Vec<_> = messages
            .iter()
            .filter(|m| m.direction() == MessageDirection::Outbound)
            .collect();
        assert_eq!(outbound.len(), 1);
        assert_eq!(outbound[0].body(), "What's your name?");

        let talk = fx.reload(&talk).await;
        assert_eq!(talk.agent_id(), Some(agent.id));
        assert_eq!(talk.message_count(), 1);
        assert_eq!(talk.date_last_message(), Some(outbound[0].sent_at()));
        assert!(matches!(
            &gateway.calls()[0],
            GatewayCall::GenerateResponse { step_slug: Some(s), history_len: 1, .. } if s == "qualify"
        ));
    }

    #[tokio::test]
    async fn history_is_limited_to_window() {
        let fx = Fixture::new().await;
        let talk = fx.talk_on_step("qualify", &[]).await;
        fx.agent(&talk).await;
        for i in 0..15 {
            fx.inbound(&talk, &format!("message {}", i)).await;
        }
        let (handler, gateway) = handler(&fx, ScriptedAiGateway::new());

        handler.handle(command(&talk), ctx()).await.unwrap();

        assert!(matches!(
            &gateway.calls()[0],
            GatewayCall::GenerateResponse { history_len: 10, .. }
        ));
    }

    #[tokio::test]
    async fn finished_flow_completes_talk_without_message() {
        let fx = Fixture::new().await;
        let talk = fx.talk_with_finished_flow().await;
        fx.agent(&talk).await;
        let (handler, gateway) = handler(&fx, ScriptedAiGateway::new());

        handler.handle(command(&talk), ctx()).await.unwrap();

        let talk = fx.reload(&talk).await;
        assert_eq!(talk.status(), TalkStatus::Completed);
        assert!(talk.closed_at().is_some());
        assert!(fx.messages.all_for_talk(&talk.id()).await.is_empty());
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn paused_talk_gets_no_reply() {
        let fx = Fixture::new().await;
        let mut talk = fx.talk_on_step("qualify", &[]).await;
        fx.agent(&talk).await;
        talk.pause("handover").unwrap();
        fx.save(&talk).await;
        let (handler, gateway) = handler(&fx, ScriptedAiGateway::new());

        handler.handle(command(&talk), ctx()).await.unwrap();

        assert!(gateway.calls().is_empty());
        assert!(fx.messages.all_for_talk(&talk.id()).await.is_empty());
    }

    #[tokio::test]
    async fn no_available_agent_stalls_quietly() {
        let fx = Fixture::new().await;
        let talk = fx.talk_on_step("qualify", &[]).await;
        let (handler, gateway) = handler(&fx, ScriptedAiGateway::new());

        let result = handler.handle(command(&talk), ctx()).await;

        assert!(result.is_ok());
        assert!(gateway.calls().is_empty());
        assert!(fx.reload(&talk).await.agent_id().is_none());
    }

    #[tokio::test]
    async fn assigned_agent_is_preferred() {
        let fx = Fixture::new().await;
        let mut talk = fx.talk_on_step("qualify", &[]).await;
        fx.agent(&talk).await;
        let mut assigned = fx.agent(&talk).await;
        assigned.available = false;
        fx.save_agent(&assigned).await;
        talk.assign_agent(assigned.id);
        fx.save(&talk).await;
        let (handler, gateway) = handler(&fx, ScriptedAiGateway::new());

        handler.handle(command(&talk), ctx()).await.unwrap();

        assert!(matches!(
            &gateway.calls()[0],
            GatewayCall::GenerateResponse { agent_id, .. } if *agent_id == assigned.id
        ));
    }

    #[tokio::test]
    async fn gateway_failure_is_retryable_and_sends_nothing() {
        let fx = Fixture::new().await;
        let talk = fx.talk_on_step("qualify", &[]).await;
        fx.agent(&talk).await;
        let (handler, _) = handler(
            &fx,
            ScriptedAiGateway::new().with_reply_failure(MockError::RateLimited {
                retry_after_secs: 5,
            }),
        );

        let err = handler.handle(command(&talk), ctx()).await.unwrap_err();

        assert!(err.is_retryable());
        assert!(fx.messages.all_for_talk(&talk.id()).await.is_empty());
    }

    #[tokio::test]
    async fn context_message_is_used_when_history_is_empty() {
        let fx = Fixture::new().await;
        let talk = fx.talk_on_step("qualify", &[]).await;
        fx.agent(&talk).await;
        let (handler, gateway) = handler(&fx, ScriptedAiGateway::new());

        handler
            .handle(
                GenerateAgentResponseCommand {
                    talk_id: talk.id(),
                    context_message: Some("hello".to_string()),
                },
                ctx(),
            )
            .await
            .unwrap();

        assert!(matches!(
            &gateway.calls()[0],
            GatewayCall::GenerateResponse { history_len: 1, .. }
        ));
    }

    #[tokio::test]
    async fn redelivery_after_failed_talk_save_keeps_single_reply() {
        let fx = Fixture::new().await;
        let mut talk = fx.talk_on_step("qualify", &[]).await;
        let agent = fx.agent(&talk).await;
        talk.assign_agent(agent.id);
        fx.save(&talk).await;
        fx.inbound(&talk, "hi").await;
        let (handler, gateway) = handler(&fx, ScriptedAiGateway::new().with_reply("Hello!"));
        let context = ctx();

        fx.talks.fail_saves(true);
        let err = handler
            .handle(command(&talk), context.clone())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        fx.talks.fail_saves(false);

        handler.handle(command(&talk), context.clone()).await.unwrap();
        // A third delivery finds everything in place.
        handler.handle(command(&talk), context).await.unwrap();

        let outbound: Vec<_> = fx
            .messages
            .all_for_talk(&talk.id())
            .await
            .into_iter()
            .filter(|m| m.direction() == MessageDirection::Outbound)
            .collect();
        assert_eq!(outbound.len(), 1);
        let talk = fx.reload(&talk).await;
        assert_eq!(talk.message_count(), 1);
        assert_eq!(talk.date_last_message(), Some(outbound[0].sent_at()));
        let generated = gateway
            .calls()
            .iter()
            .filter(|call| matches!(call, GatewayCall::GenerateResponse { .. }))
            .count();
        assert_eq!(generated, 1);
    }
}
