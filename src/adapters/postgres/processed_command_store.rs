//! PostgreSQL implementation of ProcessedCommandStore.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::foundation::{CommandId, DomainError, Timestamp};
use crate::ports::ProcessedCommandStore;

use super::row::db_error;

#[derive(Clone)]
pub struct PostgresProcessedCommandStore {
    pool: PgPool,
}

impl PostgresProcessedCommandStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProcessedCommandStore for PostgresProcessedCommandStore {
    async fn contains(
        &self,
        command_id: &CommandId,
        handler_name: &str,
    ) -> Result<bool, DomainError> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM processed_commands
                WHERE command_id = $1 AND handler_name = $2
            )
            "#,
        )
        .bind(command_id.as_uuid())
        .bind(handler_name)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("check processed command"))?;

        Ok(exists)
    }

    async fn mark_processed(
        &self,
        command_id: &CommandId,
        handler_name: &str,
    ) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO processed_commands (command_id, handler_name, processed_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (command_id, handler_name) DO NOTHING
            "#,
        )
        .bind(command_id.as_uuid())
        .bind(handler_name)
        .execute(&self.pool)
        .await
        .map_err(db_error("mark command processed"))?;

        Ok(())
    }

    async fn delete_before(&self, timestamp: Timestamp) -> Result<u64, DomainError> {
        let result = sqlx::query("DELETE FROM processed_commands WHERE processed_at < $1")
            .bind(timestamp.as_datetime())
            .execute(&self.pool)
            .await
            .map_err(db_error("delete processed commands"))?;

        Ok(result.rows_affected())
    }
}
