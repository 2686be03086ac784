//! Execution ledger port
//!
//! Durable, append-only record of executions. Every write lands before the
//! phase executor continues, and the ledger owns the per-resource locks so
//! two executions never hold the same target.

use async_trait::async_trait;
use domain::{
    Execution, ExecutionId, ExecutionStatus, ExperimentId, LedgerEvent, ResourceId,
};
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::error::ApplicationError;

/// Query over stored executions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionFilter {
    #[serde(default)]
    pub experiment_id: Option<ExperimentId>,
    #[serde(default)]
    pub status: Option<ExecutionStatus>,
    /// Only executions that have not terminated
    #[serde(default)]
    pub active_only: bool,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl ExecutionFilter {
    pub fn for_experiment(experiment_id: ExperimentId) -> Self {
        Self {
            experiment_id: Some(experiment_id),
            ..Self::default()
        }
    }

    pub fn active() -> Self {
        Self {
            active_only: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_status(mut self, status: ExecutionStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether an execution passes every set condition (limit excluded)
    pub fn matches(&self, execution: &Execution) -> bool {
        self.experiment_id.is_none_or(|id| execution.experiment_id == id)
            && self.status.is_none_or(|s| execution.status == s)
            && (!self.active_only || !execution.is_terminal())
    }
}

/// Port for the execution ledger
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ExecutionLedgerPort: Send + Sync {
    /// Store a freshly created execution
    async fn insert(&self, execution: &Execution) -> Result<(), ApplicationError>;

    /// Persist the new state of an execution and append `event`
    ///
    /// Fails with `Conflict` if the stored execution is already terminal.
    async fn record(&self, execution: &Execution, event: &LedgerEvent) -> Result<(), ApplicationError>;

    async fn get(&self, id: ExecutionId) -> Result<Option<Execution>, ApplicationError>;

    async fn list_by_experiment(
        &self,
        experiment_id: ExperimentId,
    ) -> Result<Vec<Execution>, ApplicationError>;

    /// Executions that have not reached a terminal status
    async fn list_active(&self) -> Result<Vec<Execution>, ApplicationError>;

    /// Executions matching `filter`, newest first
    async fn list(&self, filter: &ExecutionFilter) -> Result<Vec<Execution>, ApplicationError>;

    /// History of an execution in write order
    async fn events(&self, id: ExecutionId) -> Result<Vec<LedgerEvent>, ApplicationError>;

    /// Lock every resource for `execution_id`, all or nothing
    ///
    /// Fails with `Conflict` naming the first resource held by another
    /// execution. Re-acquiring locks already held by the same execution
    /// succeeds.
    async fn acquire_locks(
        &self,
        execution_id: ExecutionId,
        resources: &[ResourceId],
    ) -> Result<(), ApplicationError>;

    /// Release every lock held by `execution_id`
    async fn release_locks(&self, execution_id: ExecutionId) -> Result<(), ApplicationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_matches_everything() {
        let mut execution = Execution::new(ExperimentId::new(), "t");
        assert!(ExecutionFilter::default().matches(&execution));
        execution.fail("x").unwrap();
        assert!(ExecutionFilter::default().matches(&execution));
    }

    #[test]
    fn active_filter_skips_terminal() {
        let mut execution = Execution::new(ExperimentId::new(), "t");
        assert!(ExecutionFilter::active().matches(&execution));
        execution.abort("stop").unwrap();
        assert!(!ExecutionFilter::active().matches(&execution));
    }

    #[test]
    fn experiment_and_status_conditions_combine() {
        let experiment_id = ExperimentId::new();
        let execution = Execution::new(experiment_id, "t");

        let filter = ExecutionFilter::for_experiment(experiment_id).with_status(ExecutionStatus::Running);
        assert!(filter.matches(&execution));
        assert!(!ExecutionFilter::for_experiment(ExperimentId::new()).matches(&execution));
        assert!(!filter.with_status(ExecutionStatus::Completed).matches(&execution));
    }
}
