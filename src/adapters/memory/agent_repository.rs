//! In-memory Agent repository.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::agent::Agent;
use crate::domain::foundation::{AgentId, DomainError, OrganizationId};
use crate::ports::AgentRepository;

/// Agents kept in registration order.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAgentRepository {
    agents: Arc<RwLock<Vec<Agent>>>,
}

impl InMemoryAgentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AgentRepository for InMemoryAgentRepository {
    async fn find_by_id(&self, id: &AgentId) -> Result<Option<Agent>, DomainError> {
        Ok(self.agents.read().await.iter().find(|a| a.id == *id).cloned())
    }

    async fn find_available_in_organization(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Vec<Agent>, DomainError> {
        Ok(self
            .agents
            .read()
            .await
            .iter()
            .filter(|a| a.organization_id == *organization_id && a.can_take_talks())
            .cloned()
            .collect())
    }

    async fn save(&self, agent: &Agent) -> Result<(), DomainError> {
        let mut agents = self.agents.write().await;
        match agents.iter_mut().find(|a| a.id == agent.id) {
            Some(existing) => *existing = agent.clone(),
            None => agents.push(agent.clone()),
        }
        Ok(())
    }
}
