//! Command bus configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Worker pool and retry settings of the command bus
#[derive(Debug, Clone, Deserialize)]
pub struct BusConfig {
    /// Number of worker tasks; commands of one talk stay on one worker
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Delivery attempts before a command is dead-lettered
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First retry delay in milliseconds
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Retry delay ceiling in milliseconds
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,

    /// Skip commands that were already handled successfully
    #[serde(default = "default_idempotent")]
    pub idempotent: bool,
}

impl BusConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.workers == 0 {
            return Err(ValidationError::NoBusWorkers);
        }
        if self.max_attempts == 0 {
            return Err(ValidationError::InvalidMaxAttempts);
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(ValidationError::InvalidBackoff);
        }
        Ok(())
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
            idempotent: default_idempotent(),
        }
    }
}

fn default_workers() -> usize {
    4
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_backoff() -> u64 {
    200
}

fn default_max_backoff() -> u64 {
    10_000
}

fn default_idempotent() -> bool {
    true
}
