//! In-memory registry and ledger
//!
//! Used when `database.path = ":memory:"`: nothing survives a restart, so
//! orphan recovery has nothing to find. Semantics match the SQLite
//! adapters, including terminal-record protection and all-or-nothing locks.

use std::collections::HashMap;
use std::sync::Arc;

use application::ports::{ExecutionFilter, ExecutionLedgerPort, ExperimentRegistryPort};
use application::ApplicationError;
use async_trait::async_trait;
use domain::{Execution, ExecutionId, Experiment, ExperimentId, LedgerEvent, ResourceId};
use parking_lot::RwLock;

/// Experiments kept in insertion order
#[derive(Debug, Clone, Default)]
pub struct InMemoryExperimentRegistry {
    experiments: Arc<RwLock<Vec<Experiment>>>,
}

impl InMemoryExperimentRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExperimentRegistryPort for InMemoryExperimentRegistry {
    async fn create(&self, experiment: &Experiment) -> Result<(), ApplicationError> {
        let mut experiments = self.experiments.write();
        if experiments.iter().any(|e| e.id == experiment.id) {
            return Err(ApplicationError::Conflict(format!(
                "Experiment {} already exists",
                experiment.id
            )));
        }
        experiments.push(experiment.clone());
        Ok(())
    }

    async fn get(&self, id: ExperimentId) -> Result<Option<Experiment>, ApplicationError> {
        Ok(self.experiments.read().iter().find(|e| e.id == id).cloned())
    }

    async fn list(&self) -> Result<Vec<Experiment>, ApplicationError> {
        Ok(self.experiments.read().iter().rev().cloned().collect())
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    /// Insertion order breaks `started_at` ties when listing
    executions: Vec<Execution>,
    events: Vec<LedgerEvent>,
    locks: HashMap<ResourceId, ExecutionId>,
}

impl LedgerState {
    fn position(&self, id: ExecutionId) -> Option<usize> {
        self.executions.iter().position(|e| e.id == id)
    }
}

/// Execution ledger and resource locks
#[derive(Debug, Clone, Default)]
pub struct InMemoryExecutionLedger {
    state: Arc<RwLock<LedgerState>>,
}

impl InMemoryExecutionLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Execution currently holding `resource`
    pub fn lock_holder(&self, resource: &ResourceId) -> Option<ExecutionId> {
        self.state.read().locks.get(resource).copied()
    }
}

#[async_trait]
impl ExecutionLedgerPort for InMemoryExecutionLedger {
    async fn insert(&self, execution: &Execution) -> Result<(), ApplicationError> {
        let mut state = self.state.write();
        if state.position(execution.id).is_some() {
            return Err(ApplicationError::Conflict(format!(
                "Execution {} already exists",
                execution.id
            )));
        }
        state.executions.push(execution.clone());
        Ok(())
    }

    async fn record(&self, execution: &Execution, event: &LedgerEvent) -> Result<(), ApplicationError> {
        let mut state = self.state.write();
        let index = state
            .position(execution.id)
            .ok_or_else(|| ApplicationError::NotFound(format!("Execution {}", execution.id)))?;

        if state.executions[index].is_terminal() {
            return Err(ApplicationError::Conflict(format!(
                "Execution {} is already {}",
                execution.id, state.executions[index].status
            )));
        }

        state.executions[index] = execution.clone();
        state.events.push(event.clone());
        Ok(())
    }

    async fn get(&self, id: ExecutionId) -> Result<Option<Execution>, ApplicationError> {
        let state = self.state.read();
        Ok(state.position(id).map(|i| state.executions[i].clone()))
    }

    async fn list_by_experiment(
        &self,
        experiment_id: ExperimentId,
    ) -> Result<Vec<Execution>, ApplicationError> {
        self.list(&ExecutionFilter::for_experiment(experiment_id)).await
    }

    async fn list_active(&self) -> Result<Vec<Execution>, ApplicationError> {
        self.list(&ExecutionFilter::active()).await
    }

    async fn list(&self, filter: &ExecutionFilter) -> Result<Vec<Execution>, ApplicationError> {
        let state = self.state.read();
        let mut matching: Vec<(usize, &Execution)> = state
            .executions
            .iter()
            .enumerate()
            .filter(|(_, e)| filter.matches(e))
            .collect();
        matching.sort_by(|(ia, a), (ib, b)| b.started_at.cmp(&a.started_at).then(ib.cmp(ia)));

        let limit = filter.limit.unwrap_or(usize::MAX);
        Ok(matching.into_iter().take(limit).map(|(_, e)| e.clone()).collect())
    }

    async fn events(&self, id: ExecutionId) -> Result<Vec<LedgerEvent>, ApplicationError> {
        Ok(self
            .state
            .read()
            .events
            .iter()
            .filter(|e| e.execution_id == id)
            .cloned()
            .collect())
    }

    async fn acquire_locks(
        &self,
        execution_id: ExecutionId,
        resources: &[ResourceId],
    ) -> Result<(), ApplicationError> {
        let mut state = self.state.write();
        if let Some(taken) = resources
            .iter()
            .find(|r| state.locks.get(*r).is_some_and(|holder| *holder != execution_id))
        {
            return Err(ApplicationError::Conflict(format!("{taken} is locked")));
        }
        for resource in resources {
            state.locks.insert(resource.clone(), execution_id);
        }
        Ok(())
    }

    async fn release_locks(&self, execution_id: ExecutionId) -> Result<(), ApplicationError> {
        self.state.write().locks.retain(|_, holder| *holder != execution_id);
        Ok(())
    }
}
