//! Talk aggregate - one live conversation bound to a flow.
//!
//! # Lifecycle
//!
//! ```text
//! NEW (Active, flow not entered) → Active ⇄ Paused
//!                                  Active → Completed
//! ```
//!
//! Progress through the flow lives in `TalkFlowState` and is only mutated
//! through `TalkFlowService`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{
    AgentId, DomainError, ErrorCode, OrganizationId, StateMachine, TalkId, Timestamp, TreeFlowId,
};

use super::flow_state::TalkFlowState;

/// Lifecycle status of a talk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TalkStatus {
    #[default]
    Active,
    Paused,
    Completed,
}

impl TalkStatus {
    /// Numeric code used by persistence (active=0, paused=1, completed=2).
    pub fn as_i16(&self) -> i16 {
        match self {
            TalkStatus::Active => 0,
            TalkStatus::Paused => 1,
            TalkStatus::Completed => 2,
        }
    }

    /// Parses the persistence code.
    pub fn from_i16(code: i16) -> Result<Self, DomainError> {
        match code {
            0 => Ok(TalkStatus::Active),
            1 => Ok(TalkStatus::Paused),
            2 => Ok(TalkStatus::Completed),
            other => Err(DomainError::validation(
                "status",
                format!("Unknown talk status code: {}", other),
            )),
        }
    }
}

impl StateMachine for TalkStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use TalkStatus::*;
        matches!(
            (self, target),
            (Active, Paused) | (Paused, Active) | (Active, Completed)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use TalkStatus::*;
        match self {
            Active => vec![Paused, Completed],
            Paused => vec![Active],
            Completed => vec![],
        }
    }
}

impl fmt::Display for TalkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TalkStatus::Active => "active",
            TalkStatus::Paused => "paused",
            TalkStatus::Completed => "completed",
        };
        write!(f, "{}", s)
    }
}

/// Talk aggregate.
///
/// # Invariants
///
/// - `paused_reason`/`paused_at` are set only while status is `Paused`
/// - `closed_at` is set once status is `Completed`
/// - `message_count` never decreases
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Talk {
    id: TalkId,
    organization_id: OrganizationId,
    tree_flow_id: Option<TreeFlowId>,
    agent_id: Option<AgentId>,
    status: TalkStatus,
    paused_reason: Option<String>,
    paused_at: Option<Timestamp>,
    flow_state: TalkFlowState,
    message_count: u32,
    date_last_message: Option<Timestamp>,
    closed_at: Option<Timestamp>,
    created_at: Timestamp,
    updated_at: Timestamp,
}

impl Talk {
    /// Creates a new active talk that has not entered its flow yet.
    pub fn new(
        id: TalkId,
        organization_id: OrganizationId,
        tree_flow_id: Option<TreeFlowId>,
    ) -> Self {
        let now = Timestamp::now();
        Self {
            id,
            organization_id,
            tree_flow_id,
            agent_id: None,
            status: TalkStatus::Active,
            paused_reason: None,
            paused_at: None,
            flow_state: TalkFlowState::default(),
            message_count: 0,
            date_last_message: None,
            closed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Reconstitutes a talk from persistence (no validation).
    #[allow(clippy::too_many_arguments)]
    pub fn reconstitute(
        id: TalkId,
        organization_id: OrganizationId,
        tree_flow_id: Option<TreeFlowId>,
        agent_id: Option<AgentId>,
        status: TalkStatus,
        paused_reason: Option<String>,
        paused_at: Option<Timestamp>,
        flow_state: TalkFlowState,
        message_count: u32,
        date_last_message: Option<Timestamp>,
        closed_at: Option<Timestamp>,
        created_at: Timestamp,
        updated_at: Timestamp,
    ) -> Self {
        Self {
            id,
            organization_id,
            tree_flow_id,
            agent_id,
            status,
            paused_reason,
            paused_at,
            flow_state,
            message_count,
            date_last_message,
            closed_at,
            created_at,
            updated_at,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn id(&self) -> TalkId {
        self.id
    }

    pub fn organization_id(&self) -> OrganizationId {
        self.organization_id
    }

    pub fn tree_flow_id(&self) -> Option<TreeFlowId> {
        self.tree_flow_id
    }

    pub fn agent_id(&self) -> Option<AgentId> {
        self.agent_id
    }

    pub fn status(&self) -> TalkStatus {
        self.status
    }

    pub fn paused_reason(&self) -> Option<&str> {
        self.paused_reason.as_deref()
    }

    pub fn paused_at(&self) -> Option<Timestamp> {
        self.paused_at
    }

    /// Read-only view of flow progress.
    pub fn flow_state(&self) -> &TalkFlowState {
        &self.flow_state
    }

    pub fn message_count(&self) -> u32 {
        self.message_count
    }

    pub fn date_last_message(&self) -> Option<Timestamp> {
        self.date_last_message
    }

    pub fn closed_at(&self) -> Option<Timestamp> {
        self.closed_at
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    pub fn is_paused(&self) -> bool {
        self.status == TalkStatus::Paused
    }

    pub fn is_completed(&self) -> bool {
        self.status == TalkStatus::Completed
    }

    /// True when a flow is attached (talks without one are not automated).
    pub fn has_flow(&self) -> bool {
        self.tree_flow_id.is_some()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Commands
    // ─────────────────────────────────────────────────────────────────────────

    /// Hands the talk over to a human.
    pub fn pause(&mut self, reason: impl Into<String>) -> Result<(), DomainError> {
        self.transition(TalkStatus::Paused)?;
        let now = Timestamp::now();
        self.paused_reason = Some(reason.into());
        self.paused_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Returns a paused talk to automation.
    pub fn resume(&mut self) -> Result<(), DomainError> {
        self.transition(TalkStatus::Active)?;
        self.paused_reason = None;
        self.paused_at = None;
        self.updated_at = Timestamp::now();
        Ok(())
    }

    /// Closes the talk once its flow has ended.
    pub fn complete(&mut self) -> Result<(), DomainError> {
        self.transition(TalkStatus::Completed)?;
        let now = Timestamp::now();
        self.closed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn assign_agent(&mut self, agent_id: AgentId) {
        self.agent_id = Some(agent_id);
        self.updated_at = Timestamp::now();
    }

    /// Bumps the message counters after a message was persisted.
    pub fn record_message(&mut self, sent_at: Timestamp) {
        self.message_count += 1;
        if self.date_last_message.map_or(true, |last| sent_at.is_after(&last)) {
            self.date_last_message = Some(sent_at);
        }
        self.updated_at = Timestamp::now();
    }

    pub(super) fn flow_state_mut(&mut self) -> &mut TalkFlowState {
        self.updated_at = Timestamp::now();
        &mut self.flow_state
    }

    fn transition(&mut self, target: TalkStatus) -> Result<(), DomainError> {
        self.status = self.status.transition_to(target).map_err(|e| {
            DomainError::new(ErrorCode::InvalidStateTransition, e.to_string())
                .with_detail("talk_id", self.id.to_string())
        })?;
        Ok(())
    }
}
