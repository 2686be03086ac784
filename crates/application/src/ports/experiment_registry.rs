//! Experiment registry port
//!
//! Stores immutable experiment definitions keyed by id.

use async_trait::async_trait;
use domain::{Experiment, ExperimentId};
#[cfg(test)]
use mockall::automock;

use crate::error::ApplicationError;

/// Port for experiment storage
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ExperimentRegistryPort: Send + Sync {
    /// Register a new experiment; an existing id is a conflict
    async fn create(&self, experiment: &Experiment) -> Result<(), ApplicationError>;

    async fn get(&self, id: ExperimentId) -> Result<Option<Experiment>, ApplicationError>;

    /// All experiments, newest first
    async fn list(&self) -> Result<Vec<Experiment>, ApplicationError>;
}
