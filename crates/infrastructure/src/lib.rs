//! Infrastructure layer - Adapters for external systems
//!
//! Implements ports defined in the application layer: the SQLite ledger,
//! HTTP adapters for the control plane and host agents, notifiers and the
//! failure drivers. Also owns configuration, telemetry and the composition
//! root that wires everything into a `ChaosService`.

pub mod adapters;
pub mod bootstrap;
pub mod config;
pub mod drivers;
pub mod http;
pub mod persistence;
pub mod retry;
pub mod telemetry;
#[cfg(test)]
pub(crate) mod testing;
pub mod validation;

pub use adapters::*;
pub use bootstrap::{BootstrapError, Orchestrator, OrchestratorBuilder};
pub use config::{
    AppConfig, DatabaseConfig, DriverLimits, Environment, NotifierConfig, NotifierKind,
    OrchestratorConfig, PlatformConfig, RetryAppConfig, TelemetryAppConfig,
};
pub use drivers::standard_registry;
pub use http::{PlatformError, PlatformHttpClient, X_REQUEST_ID};
pub use persistence::{AsyncDatabase, AsyncDatabaseConfig, SqliteExecutionLedger, SqliteExperimentRegistry};
pub use retry::{RetryConfig, RetryResult, Retryable, retry, with_retry};
pub use telemetry::{TelemetryError, init_telemetry};
pub use validation::{ConfigValidator, ConfigWarning, WarningSeverity};
