//! PostgreSQL implementation of TalkRepository.
//!
//! Flow progress is stored as JSONB next to the talk row so that a single
//! upsert persists the whole aggregate.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::foundation::{
    AgentId, DomainError, ErrorCode, OrganizationId, TalkId, TreeFlowId,
};
use crate::domain::talk::{Talk, TalkFlowState, TalkStatus};
use crate::ports::TalkRepository;

use super::row::{column, db_error, optional_timestamp, timestamp};

#[derive(Clone)]
pub struct PostgresTalkRepository {
    pool: PgPool,
}

impl PostgresTalkRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TalkRepository for PostgresTalkRepository {
    async fn find_by_id(&self, id: &TalkId) -> Result<Option<Talk>, DomainError> {
        let row = sqlx::query(
            r#"
            SELECT id, organization_id, tree_flow_id, agent_id, status,
                   paused_reason, paused_at, flow_state, message_count,
                   date_last_message, closed_at, created_at, updated_at
            FROM talks
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("fetch talk"))?;

        row.map(|row| row_to_talk(&row)).transpose()
    }

    async fn save(&self, talk: &Talk) -> Result<(), DomainError> {
        let flow_state = serde_json::to_value(talk.flow_state()).map_err(|e| {
            DomainError::new(ErrorCode::SerializationError, e.to_string())
                .with_detail("talk_id", talk.id().to_string())
        })?;

        sqlx::query(
            r#"
            INSERT INTO talks (
                id, organization_id, tree_flow_id, agent_id, status,
                paused_reason, paused_at, flow_state, message_count,
                date_last_message, closed_at, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (id) DO UPDATE SET
                tree_flow_id = EXCLUDED.tree_flow_id,
                agent_id = EXCLUDED.agent_id,
                status = EXCLUDED.status,
                paused_reason = EXCLUDED.paused_reason,
                paused_at = EXCLUDED.paused_at,
                flow_state = EXCLUDED.flow_state,
                message_count = EXCLUDED.message_count,
                date_last_message = EXCLUDED.date_last_message,
                closed_at = EXCLUDED.closed_at,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(talk.id().as_uuid())
        .bind(talk.organization_id().as_uuid())
        .bind(talk.tree_flow_id().map(|id| *id.as_uuid()))
        .bind(talk.agent_id().map(|id| *id.as_uuid()))
        .bind(talk.status().as_i16())
        .bind(talk.paused_reason())
        .bind(talk.paused_at().map(|t| *t.as_datetime()))
        .bind(flow_state)
        .bind(talk.message_count() as i32)
        .bind(talk.date_last_message().map(|t| *t.as_datetime()))
        .bind(talk.closed_at().map(|t| *t.as_datetime()))
        .bind(talk.created_at().as_datetime())
        .bind(talk.updated_at().as_datetime())
        .execute(&self.pool)
        .await
        .map_err(db_error("save talk"))?;

        Ok(())
    }
}

fn row_to_talk(row: &sqlx::postgres::PgRow) -> Result<Talk, DomainError> {
    let flow_state: serde_json::Value = column(row, "flow_state")?;
    let flow_state: TalkFlowState = serde_json::from_value(flow_state).map_err(|e| {
        DomainError::new(
            ErrorCode::DatabaseError,
            format!("Invalid flow_state: {}", e),
        )
    })?;
    let message_count: i32 = column(row, "message_count")?;

    Ok(Talk::reconstitute(
        TalkId::from_uuid(column(row, "id")?),
        OrganizationId::from_uuid(column(row, "organization_id")?),
        column::<Option<uuid::Uuid>>(row, "tree_flow_id")?.map(TreeFlowId::from_uuid),
        column::<Option<uuid::Uuid>>(row, "agent_id")?.map(AgentId::from_uuid),
        TalkStatus::from_i16(column(row, "status")?)?,
        column(row, "paused_reason")?,
        optional_timestamp(row, "paused_at")?,
        flow_state,
        message_count.max(0) as u32,
        optional_timestamp(row, "date_last_message")?,
        optional_timestamp(row, "closed_at")?,
        timestamp(row, "created_at")?,
        timestamp(row, "updated_at")?,
    ))
}
