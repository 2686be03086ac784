//! Application configuration
//!
//! Split into focused sub-modules:
//! - `database`: SQLite ledger settings
//! - `orchestrator`: phase executor timing, blast radius ceiling, concurrency
//! - `drivers`: per-kind safe maxima for failure parameters
//! - `platform`: control plane and agent endpoints
//! - `notifier`: terminal-state notification delivery
//! - `resilience`: telemetry and retry
//!
//! Sources are layered: built-in defaults, then an optional `config.toml`,
//! then `CHAOS_` environment variables where `__` separates nested keys
//! (e.g. `CHAOS_ORCHESTRATOR__POLL_INTERVAL_SECS=10`).

mod database;
mod drivers;
mod notifier;
mod orchestrator;
mod platform;
mod resilience;

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use validator::Validate;

pub use database::DatabaseConfig;
pub use drivers::DriverLimits;
pub use notifier::{NotifierConfig, NotifierKind};
pub use orchestrator::OrchestratorConfig;
pub use platform::PlatformConfig;
pub use resilience::{LogFormat, RetryAppConfig, TelemetryAppConfig};

/// Shared default for boolean `true` fields across config structs
pub(crate) const fn default_true() -> bool {
    true
}

/// Deployment environment
///
/// Production turns critical configuration warnings into a startup failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            _ => Err(format!(
                "Invalid environment: {s}. Use 'development' or 'production'"
            )),
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    #[serde(default)]
    pub environment: Environment,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    #[validate(nested)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    #[validate(nested)]
    pub drivers: DriverLimits,

    #[serde(default)]
    pub platform: PlatformConfig,

    #[serde(default)]
    pub notifier: NotifierConfig,

    #[serde(default)]
    pub telemetry: TelemetryAppConfig,

    #[serde(default)]
    pub retry: RetryAppConfig,
}

impl AppConfig {
    /// Load configuration from `config.toml` (if present) and the environment
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::build(config::File::with_name("config").required(false))
    }

    /// Load configuration from an explicit file, still honoring the environment
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, config::ConfigError> {
        Self::build(config::File::from(path.as_ref()).required(true))
    }

    fn build<S>(file: S) -> Result<Self, config::ConfigError>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let builder = config::Config::builder()
            .set_default("database.path", "chaos.db")?
            .set_default("notifier.kind", "log")?
            .add_source(file)
            .add_source(
                config::Environment::with_prefix("CHAOS")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        let config: Self = builder.build()?.try_deserialize()?;
        config
            .validate()
            .map_err(|e| config::ConfigError::Message(format!("Invalid configuration: {e}")))?;
        Ok(config)
    }
}
