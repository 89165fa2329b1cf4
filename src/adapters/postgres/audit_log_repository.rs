//! PostgreSQL implementation of AuditLogRepository.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::audit::{AuditLog, AuditMetadata};
use crate::domain::foundation::{AuditLogId, DomainError, ErrorCode, UserId};
use crate::ports::AuditLogRepository;

use super::row::{column, db_error, timestamp};

#[derive(Clone)]
pub struct PostgresAuditLogRepository {
    pool: PgPool,
}

impl PostgresAuditLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditLogRepository for PostgresAuditLogRepository {
    async fn save(&self, log: &AuditLog) -> Result<(), DomainError> {
        let metadata = log
            .metadata
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| DomainError::new(ErrorCode::SerializationError, e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO audit_logs (
                id, action, entity_class, entity_id, user_id, changes, metadata, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(log.id.as_uuid())
        .bind(&log.action)
        .bind(&log.entity_class)
        .bind(log.entity_id)
        .bind(log.user_id.as_ref().map(UserId::as_str))
        .bind(&log.changes)
        .bind(metadata)
        .bind(log.created_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(db_error("insert audit log"))?;

        Ok(())
    }

    async fn find_by_entity(&self, entity_id: &Uuid) -> Result<Vec<AuditLog>, DomainError> {
        let rows = sqlx::query(
            r#"
            SELECT id, action, entity_class, entity_id, user_id, changes, metadata, created_at
            FROM audit_logs
            WHERE entity_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("fetch audit logs"))?;

        rows.iter().map(row_to_audit_log).collect()
    }
}

fn row_to_audit_log(row: &sqlx::postgres::PgRow) -> Result<AuditLog, DomainError> {
    let user_id = column::<Option<String>>(row, "user_id")?
        .map(UserId::new)
        .transpose()
        .map_err(|e| DomainError::new(ErrorCode::DatabaseError, format!("Invalid user_id: {}", e)))?;
    let metadata = column::<Option<serde_json::Value>>(row, "metadata")?
        .map(serde_json::from_value::<AuditMetadata>)
        .transpose()
        .map_err(|e| DomainError::new(ErrorCode::DatabaseError, format!("Invalid metadata: {}", e)))?;

    Ok(AuditLog {
        id: AuditLogId::from_uuid(column(row, "id")?),
        action: column(row, "action")?,
        entity_class: column(row, "entity_class")?,
        entity_id: column(row, "entity_id")?,
        user_id,
        changes: column(row, "changes")?,
        metadata,
        created_at: timestamp(row, "created_at")?,
    })
}
