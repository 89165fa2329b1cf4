//! PostgreSQL implementation of AgentRepository.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::agent::Agent;
use crate::domain::foundation::{AgentId, DomainError, OrganizationId};
use crate::ports::AgentRepository;

use super::row::{column, db_error};

#[derive(Clone)]
pub struct PostgresAgentRepository {
    pool: PgPool,
}

impl PostgresAgentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AgentRepository for PostgresAgentRepository {
    async fn find_by_id(&self, id: &AgentId) -> Result<Option<Agent>, DomainError> {
        let row = sqlx::query(
            "SELECT id, organization_id, name, instructions, active, available FROM agents WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("fetch agent"))?;

        row.map(|row| row_to_agent(&row)).transpose()
    }

    async fn find_available_in_organization(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Vec<Agent>, DomainError> {
        let rows = sqlx::query(
            r#"
            SELECT id, organization_id, name, instructions, active, available
            FROM agents
            WHERE organization_id = $1 AND active AND available
            ORDER BY created_at, id
            "#,
        )
        .bind(organization_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("fetch available agents"))?;

        rows.iter().map(row_to_agent).collect()
    }

    async fn save(&self, agent: &Agent) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO agents (id, organization_id, name, instructions, active, available)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                instructions = EXCLUDED.instructions,
                active = EXCLUDED.active,
                available = EXCLUDED.available
            "#,
        )
        .bind(agent.id.as_uuid())
        .bind(agent.organization_id.as_uuid())
        .bind(&agent.name)
        .bind(&agent.instructions)
        .bind(agent.active)
        .bind(agent.available)
        .execute(&self.pool)
        .await
        .map_err(db_error("save agent"))?;

        Ok(())
    }
}

fn row_to_agent(row: &sqlx::postgres::PgRow) -> Result<Agent, DomainError> {
    Ok(Agent {
        id: AgentId::from_uuid(column(row, "id")?),
        organization_id: OrganizationId::from_uuid(column(row, "organization_id")?),
        name: column(row, "name")?,
        instructions: column(row, "instructions")?,
        active: column(row, "active")?,
        available: column(row, "available")?,
    })
}
