//! Flow definition configuration

use serde::Deserialize;
use std::path::PathBuf;

use super::error::ValidationError;

/// Where flow definitions live
#[derive(Debug, Clone, Deserialize)]
pub struct FlowsConfig {
    /// Directory of YAML flow definitions
    #[serde(default = "default_dir")]
    pub dir: PathBuf,

    /// Threshold for `not_completed_after_attempts` inputs that omit one
    #[serde(default = "default_max_attempts")]
    pub default_max_attempts: u32,
}

impl FlowsConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.dir.as_os_str().is_empty() {
            return Err(ValidationError::MissingRequired("FLOWS__DIR"));
        }
        if self.default_max_attempts == 0 {
            return Err(ValidationError::InvalidAttemptThreshold);
        }
        Ok(())
    }
}

impl Default for FlowsConfig {
    fn default() -> Self {
        Self {
            dir: default_dir(),
            default_max_attempts: default_max_attempts(),
        }
    }
}

fn default_dir() -> PathBuf {
    PathBuf::from("flows")
}

fn default_max_attempts() -> u32 {
    crate::domain::flow::DEFAULT_MAX_ATTEMPTS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flows_config_defaults() {
        let config = FlowsConfig::default();
        assert_eq!(config.dir, PathBuf::from("flows"));
        assert_eq!(config.default_max_attempts, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_zero_threshold() {
        let config = FlowsConfig {
            default_max_attempts: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ValidationError::InvalidAttemptThreshold)
        );
    }
}
