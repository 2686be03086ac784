//! Persistence module
//!
//! SQLite storage for experiments, the execution ledger and resource locks.

pub mod async_connection;
pub mod error;
pub mod execution_ledger;
pub mod experiment_registry;

pub use async_connection::{AsyncDatabase, AsyncDatabaseConfig, AsyncDatabaseError};
pub use execution_ledger::SqliteExecutionLedger;
pub use experiment_registry::SqliteExperimentRegistry;
