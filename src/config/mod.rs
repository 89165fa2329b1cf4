//! Application configuration module
//!
//! Type-safe configuration loaded from environment variables using the
//! `config` and `dotenvy` crates. Variables use the `TALKFLOW` prefix and
//! nested values are separated by double underscores.
//!
//! # Example
//!
//! ```no_run
//! use talkflow::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Loading flows from {}", config.flows.dir.display());
//! ```

mod ai;
mod bus;
mod database;
mod error;
mod flows;
mod logging;
mod pipeline;

pub use ai::{AiConfig, AiProviderKind};
pub use bus::BusConfig;
pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use flows::FlowsConfig;
pub use logging::LoggingConfig;
pub use pipeline::PipelineConfig;

use serde::Deserialize;

/// Root configuration of the talkflow worker.
///
/// Every section has defaults except the Anthropic key: an empty environment
/// loads, but only validates once `ai.provider` is `scripted` or a key is set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection; in-memory repositories when absent
    #[serde(default)]
    pub database: DatabaseConfig,

    /// AI provider (Anthropic)
    #[serde(default)]
    pub ai: AiConfig,

    /// Command bus workers and retries
    #[serde(default)]
    pub bus: BusConfig,

    /// Flow definition directory
    #[serde(default)]
    pub flows: FlowsConfig,

    /// Handler tunables
    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `TALKFLOW` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `TALKFLOW__DATABASE__URL=...` -> `database.url = ...`
    /// - `TALKFLOW__BUS__WORKERS=8` -> `bus.workers = 8`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values cannot be parsed into expected types.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("TALKFLOW")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns the first `ValidationError` found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.database.validate()?;
        self.ai.validate()?;
        self.bus.validate()?;
        self.flows.validate()?;
        self.pipeline.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}
