//! TalkMessage - one immutable chat message of a talk.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{AgentId, TalkId, TalkMessageId, Timestamp, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageDirection {
    Inbound,
    Outbound,
}

impl MessageDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageDirection::Inbound => "inbound",
            MessageDirection::Outbound => "outbound",
        }
    }
}

/// Who wrote the message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum MessageSender {
    Agent(AgentId),
    User(UserId),
    Contact,
}

/// Append-only chat history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TalkMessage {
    id: TalkMessageId,
    talk_id: TalkId,
    direction: MessageDirection,
    body: String,
    sender: MessageSender,
    sent_at: Timestamp,
}

impl TalkMessage {
    /// Message received from the contact.
    pub fn inbound_from_contact(talk_id: TalkId, body: impl Into<String>) -> Self {
        Self {
            id: TalkMessageId::new(),
            talk_id,
            direction: MessageDirection::Inbound,
            body: body.into(),
            sender: MessageSender::Contact,
            sent_at: Timestamp::now(),
        }
    }

    /// Reply sent by an agent.
    pub fn outbound_from_agent(talk_id: TalkId, agent_id: AgentId, body: impl Into<String>) -> Self {
        Self {
            id: TalkMessageId::new(),
            talk_id,
            direction: MessageDirection::Outbound,
            body: body.into(),
            sender: MessageSender::Agent(agent_id),
            sent_at: Timestamp::now(),
        }
    }

    /// Replaces the generated id, for messages whose id derives from the
    /// command that produced them.
    pub fn with_id(mut self, id: TalkMessageId) -> Self {
        self.id = id;
        self
    }

    /// Reconstitutes a message from persistence.
    pub fn reconstitute(
        id: TalkMessageId,
        talk_id: TalkId,
        direction: MessageDirection,
        body: String,
        sender: MessageSender,
        sent_at: Timestamp,
    ) -> Self {
        Self {
            id,
            talk_id,
            direction,
            body,
            sender,
            sent_at,
        }
    }

    pub fn id(&self) -> TalkMessageId {
        self.id
    }

    pub fn talk_id(&self) -> TalkId {
        self.talk_id
    }

    pub fn direction(&self) -> MessageDirection {
        self.direction
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn sender(&self) -> &MessageSender {
        &self.sender
    }

    pub fn sent_at(&self) -> Timestamp {
        self.sent_at
    }

    pub fn is_inbound(&self) -> bool {
        self.direction == MessageDirection::Inbound
    }
}
