//! In-memory TreeFlow repository.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::flow::FlowGraph;
use crate::domain::foundation::{DomainError, TreeFlowId};
use crate::ports::TreeFlowRepository;

#[derive(Debug, Clone, Default)]
pub struct InMemoryTreeFlowRepository {
    flows: Arc<RwLock<HashMap<TreeFlowId, Arc<FlowGraph>>>>,
}

impl InMemoryTreeFlowRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a flow and returns the shared snapshot.
    pub async fn insert(&self, flow: FlowGraph) -> Arc<FlowGraph> {
        let flow = Arc::new(flow);
        self.flows.write().await.insert(flow.id(), Arc::clone(&flow));
        flow
    }
}

#[async_trait]
impl TreeFlowRepository for InMemoryTreeFlowRepository {
    async fn find_by_id(&self, id: &TreeFlowId) -> Result<Option<Arc<FlowGraph>>, DomainError> {
        Ok(self.flows.read().await.get(id).cloned())
    }
}
