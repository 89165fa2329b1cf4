//! Pipeline handler configuration

use serde::Deserialize;

use super::error::ValidationError;

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Recent messages handed to the model when replying
    #[serde(default = "default_history_window")]
    pub history_window: usize,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.history_window == 0 {
            return Err(ValidationError::InvalidHistoryWindow);
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            history_window: default_history_window(),
        }
    }
}

fn default_history_window() -> usize {
    10
}
