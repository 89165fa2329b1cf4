//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid database URL format")]
    InvalidDatabaseUrl,

    #[error("Pool min_connections exceeds max_connections")]
    InvalidPoolSize,

    #[error("Pool size exceeds maximum allowed (100)")]
    PoolSizeTooLarge,

    #[error("Invalid AI request timeout")]
    InvalidAiTimeout,

    #[error("Bus needs at least one worker")]
    NoBusWorkers,

    #[error("Bus max_attempts must be at least 1")]
    InvalidMaxAttempts,

    #[error("Bus initial backoff exceeds max backoff")]
    InvalidBackoff,

    #[error("Flow attempt threshold must be at least 1")]
    InvalidAttemptThreshold,

    #[error("History window must be at least 1")]
    InvalidHistoryWindow,

    #[error("Invalid log filter: {0}")]
    InvalidLogFilter(String),
}
