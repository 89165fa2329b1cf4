//! InboundMessageService - the pipeline's front door.
//!
//! Persists an inbound message, bumps the talk's counters and schedules
//! `ProcessTalkMessageCommand`. Everything after that runs on the bus.

use std::sync::Arc;

use crate::domain::foundation::{CommandId, CommandMetadata, DomainError, ErrorCode, TalkId};
use crate::domain::talk::TalkMessage;
use crate::ports::{CommandDispatcher, CommandDispatcherExt, TalkMessageRepository, TalkRepository};

use super::commands::ProcessTalkMessageCommand;

pub struct InboundMessageService {
    talks: Arc<dyn TalkRepository>,
    messages: Arc<dyn TalkMessageRepository>,
    dispatcher: Arc<dyn CommandDispatcher>,
}

impl InboundMessageService {
    pub fn new(
        talks: Arc<dyn TalkRepository>,
        messages: Arc<dyn TalkMessageRepository>,
        dispatcher: Arc<dyn CommandDispatcher>,
    ) -> Self {
        Self {
            talks,
            messages,
            dispatcher,
        }
    }

    /// Stores a contact's message and schedules its processing.
    ///
    /// # Errors
    ///
    /// - `ValidationFailed` for a blank body
    /// - `TalkNotFound` if the talk does not exist
    /// - `DatabaseError` / `DispatchError` from the ports
    pub async fn receive(
        &self,
        talk_id: TalkId,
        body: &str,
        metadata: CommandMetadata,
    ) -> Result<(TalkMessage, CommandId), DomainError> {
        if body.trim().is_empty() {
            return Err(DomainError::validation("body", "Message body cannot be empty"));
        }

        let mut talk = self.talks.find_by_id(&talk_id).await?.ok_or_else(|| {
            DomainError::new(ErrorCode::TalkNotFound, "Talk not found")
                .with_detail("talk_id", talk_id.to_string())
        })?;

        let message = TalkMessage::inbound_from_contact(talk_id, body);
        self.messages.save(&message).await?;
        talk.record_message(message.sent_at());
        self.talks.save(&talk).await?;

        let command_id = self
            .dispatcher
            .send(
                &ProcessTalkMessageCommand {
                    talk_message_id: message.id(),
                    talk_id,
                },
                metadata,
            )
            .await?;

        tracing::info!(
            talk_id = %talk_id,
            talk_message_id = %message.id(),
            command_id = %command_id,
            "Inbound message accepted"
        );
        Ok((message, command_id))
    }
}
