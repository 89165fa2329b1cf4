//! Agent - persona that answers on behalf of an organization.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{AgentId, OrganizationId, ValidationError};

/// Automated or human persona sending outbound messages for talks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub organization_id: OrganizationId,
    pub name: String,
    /// Persona and tone instructions handed to the language model.
    pub instructions: String,
    pub active: bool,
    /// Whether the agent currently accepts new talks.
    pub available: bool,
}

impl Agent {
    /// Creates an active, available agent.
    pub fn new(
        organization_id: OrganizationId,
        name: impl Into<String>,
        instructions: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ValidationError::empty_field("name"));
        }
        Ok(Self {
            id: AgentId::new(),
            organization_id,
            name,
            instructions: instructions.into(),
            active: true,
            available: true,
        })
    }

    /// Can be assigned to a new talk.
    pub fn can_take_talks(&self) -> bool {
        self.active && self.available
    }
}
