//! PostgreSQL implementation of TalkMessageRepository.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::foundation::{
    AgentId, DomainError, ErrorCode, TalkId, TalkMessageId, UserId,
};
use crate::domain::talk::{MessageDirection, MessageSender, TalkMessage};
use crate::ports::TalkMessageRepository;

use super::row::{column, db_error, timestamp};

const SELECT_COLUMNS: &str =
    "SELECT id, talk_id, direction, body, sender_kind, sender_id, sent_at FROM talk_messages";

#[derive(Clone)]
pub struct PostgresTalkMessageRepository {
    pool: PgPool,
}

impl PostgresTalkMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TalkMessageRepository for PostgresTalkMessageRepository {
    async fn find_by_id(&self, id: &TalkMessageId) -> Result<Option<TalkMessage>, DomainError> {
        let row = sqlx::query(&format!("{} WHERE id = $1", SELECT_COLUMNS))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("fetch talk message"))?;

        row.map(|row| row_to_message(&row)).transpose()
    }

    async fn save(&self, message: &TalkMessage) -> Result<(), DomainError> {
        let (sender_kind, sender_id) = sender_columns(message.sender());

        sqlx::query(
            r#"
            INSERT INTO talk_messages (
                id, talk_id, direction, body, sender_kind, sender_id, sent_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(message.id().as_uuid())
        .bind(message.talk_id().as_uuid())
        .bind(message.direction().as_str())
        .bind(message.body())
        .bind(sender_kind)
        .bind(sender_id)
        .bind(message.sent_at().as_datetime())
        .execute(&self.pool)
        .await
        .map_err(db_error("insert talk message"))?;

        Ok(())
    }

    async fn recent_for_talk(
        &self,
        talk_id: &TalkId,
        limit: usize,
    ) -> Result<Vec<TalkMessage>, DomainError> {
        let rows = sqlx::query(&format!(
            "{} WHERE talk_id = $1 ORDER BY sent_at DESC, id DESC LIMIT $2",
            SELECT_COLUMNS
        ))
        .bind(talk_id.as_uuid())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("fetch recent talk messages"))?;

        let mut messages = rows
            .iter()
            .map(row_to_message)
            .collect::<Result<Vec<_>, _>>()?;
        messages.reverse();
        Ok(messages)
    }

    async fn latest_inbound(&self, talk_id: &TalkId) -> Result<Option<TalkMessage>, DomainError> {
        let row = sqlx::query(&format!(
            "{} WHERE talk_id = $1 AND direction = 'inbound' ORDER BY sent_at DESC, id DESC LIMIT 1",
            SELECT_COLUMNS
        ))
        .bind(talk_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("fetch latest inbound message"))?;

        row.map(|row| row_to_message(&row)).transpose()
    }
}

fn sender_columns(sender: &MessageSender) -> (&'static str, Option<String>) {
    match sender {
        MessageSender::Agent(id) => ("agent", Some(id.to_string())),
        MessageSender::User(id) => ("user", Some(id.as_str().to_string())),
        MessageSender::Contact => ("contact", None),
    }
}

fn row_to_message(row: &sqlx::postgres::PgRow) -> Result<TalkMessage, DomainError> {
    let direction = match column::<String>(row, "direction")?.as_str() {
        "inbound" => MessageDirection::Inbound,
        "outbound" => MessageDirection::Outbound,
        other => {
            return Err(DomainError::new(
                ErrorCode::DatabaseError,
                format!("Invalid message direction: {}", other),
            ))
        }
    };

    let sender_kind: String = column(row, "sender_kind")?;
    let sender_id: Option<String> = column(row, "sender_id")?;
    let sender = match (sender_kind.as_str(), sender_id) {
        ("contact", _) => MessageSender::Contact,
        ("agent", Some(id)) => MessageSender::Agent(id.parse::<AgentId>().map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Invalid agent id: {}", e))
        })?),
        ("user", Some(id)) => MessageSender::User(UserId::new(id).map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Invalid user id: {}", e))
        })?),
        (kind, _) => {
            return Err(DomainError::new(
                ErrorCode::DatabaseError,
                format!("Invalid message sender: {}", kind),
            ))
        }
    };

    Ok(TalkMessage::reconstitute(
        TalkMessageId::from_uuid(column(row, "id")?),
        TalkId::from_uuid(column(row, "talk_id")?),
        direction,
        column(row, "body")?,
        sender,
        timestamp(row, "sent_at")?,
    ))
}
