//! TreeFlow repository port - read access to flow definitions.
//!
//! Flows are immutable snapshots shared between handler invocations.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::flow::FlowGraph;
use crate::domain::foundation::{DomainError, TreeFlowId};

#[async_trait]
pub trait TreeFlowRepository: Send + Sync {
    /// Find a flow by its ID.
    ///
    /// Returns `None` if not found.
    async fn find_by_id(&self, id: &TreeFlowId) -> Result<Option<Arc<FlowGraph>>, DomainError>;
}
