//! File-backed TreeFlow repository.
//!
//! Loads every `*.yaml` / `*.yml` file of a directory once at startup. A
//! malformed file or a duplicated flow id aborts the load; authoring
//! defects reported by `FlowGraph::diagnostics` are only logged.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::flow::{FlowDefinition, FlowGraph};
use crate::domain::foundation::{DomainError, ErrorCode, TreeFlowId};
use crate::ports::TreeFlowRepository;

#[derive(Debug, Clone)]
pub struct FileTreeFlowRepository {
    directory: PathBuf,
    flows: HashMap<TreeFlowId, Arc<FlowGraph>>,
}

impl FileTreeFlowRepository {
    /// Loads all flow definitions found directly under `directory`.
    pub async fn load_dir(
        directory: impl AsRef<Path>,
        default_max_attempts: u32,
    ) -> Result<Self, DomainError> {
        let directory = directory.as_ref().to_path_buf();
        let mut entries = tokio::fs::read_dir(&directory)
            .await
            .map_err(|e| io_error(&directory, e))?;

        let mut paths = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error(&directory, e))?
        {
            let path = entry.path();
            let is_file = entry
                .file_type()
                .await
                .map(|t| t.is_file())
                .unwrap_or(false);
            if is_file && has_flow_extension(&path) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut flows = HashMap::new();
        for path in paths {
            let flow = load_file(&path, default_max_attempts).await?;
            let id = flow.id();
            if flows.insert(id, Arc::new(flow)).is_some() {
                return Err(DomainError::invalid_flow("Duplicate flow id")
                    .with_detail("flow_id", id.to_string())
                    .with_detail("path", path.display().to_string()));
            }
        }

        tracing::info!(
            directory = %directory.display(),
            flows = flows.len(),
            "Loaded flow definitions"
        );
        Ok(Self { directory, flows })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }
}

#[async_trait]
impl TreeFlowRepository for FileTreeFlowRepository {
    async fn find_by_id(&self, id: &TreeFlowId) -> Result<Option<Arc<FlowGraph>>, DomainError> {
        Ok(self.flows.get(id).cloned())
    }
}

fn has_flow_extension(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml") | Some("yml")
    )
}

async fn load_file(path: &Path, default_max_attempts: u32) -> Result<FlowGraph, DomainError> {
    let source = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| io_error(path, e))?;

    let flow = FlowDefinition::from_yaml(&source)
        .and_then(|definition| definition.into_graph(default_max_attempts))
        .map_err(|e| e.with_detail("path", path.display().to_string()))?;

    for diagnostic in flow.diagnostics() {
        tracing::warn!(
            flow_id = %flow.id(),
            flow = flow.name(),
            path = %path.display(),
            ?diagnostic,
            "Flow definition defect"
        );
    }
    Ok(flow)
}

fn io_error(path: &Path, e: std::io::Error) -> DomainError {
    DomainError::new(
        ErrorCode::InternalError,
        format!("Failed to read flow definitions: {}", e),
    )
    .with_detail("path", path.display().to_string())
}
