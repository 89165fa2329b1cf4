//! Agent repository port.

use async_trait::async_trait;

use crate::domain::agent::Agent;
use crate::domain::foundation::{AgentId, DomainError, OrganizationId};

#[async_trait]
pub trait AgentRepository: Send + Sync {
    async fn find_by_id(&self, id: &AgentId) -> Result<Option<Agent>, DomainError>;

    /// Agents of an organization that are active and available, in a stable
    /// order (the first one is assigned to new talks).
    async fn find_available_in_organization(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Vec<Agent>, DomainError>;

    async fn save(&self, agent: &Agent) -> Result<(), DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_repository_is_object_safe() {
        fn _accepts_dyn(_repo: &dyn AgentRepository) {}
    }
}
