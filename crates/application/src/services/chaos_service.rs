//! Chaos Service - The orchestrator's public API

use std::sync::Arc;

use domain::{
    Execution, ExecutionId, ExecutionRecord, Experiment, ExperimentDefinition, ExperimentId,
    LedgerEvent,
};
use tracing::{info, instrument, warn};

use super::phase_executor::{AbortAck, PhaseExecutor};
use crate::error::ApplicationError;
use crate::ports::{ExecutionFilter, ExecutionLedgerPort, ExperimentRegistryPort};

/// Entry point for creating, running and inspecting experiments
pub struct ChaosService {
    registry: Arc<dyn ExperimentRegistryPort>,
    ledger: Arc<dyn ExecutionLedgerPort>,
    executor: PhaseExecutor,
}

impl std::fmt::Debug for ChaosService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChaosService")
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}

impl ChaosService {
    pub fn new(
        registry: Arc<dyn ExperimentRegistryPort>,
        ledger: Arc<dyn ExecutionLedgerPort>,
        executor: PhaseExecutor,
    ) -> Self {
        Self {
            registry,
            ledger,
            executor,
        }
    }

    /// Validate and register an experiment
    #[instrument(skip(self, definition), fields(name = %definition.name))]
    pub async fn create_experiment(
        &self,
        definition: ExperimentDefinition,
    ) -> Result<ExperimentId, ApplicationError> {
        let experiment = Experiment::from_definition(definition)?;
        self.registry.create(&experiment).await?;
        info!(
            experiment_id = %experiment.id,
            failure_type = %experiment.failure_type,
            targets = experiment.target_resources.len(),
            "Experiment registered"
        );
        Ok(experiment.id)
    }

    pub async fn get_experiment(&self, id: ExperimentId) -> Result<Experiment, ApplicationError> {
        self.registry
            .get(id)
            .await?
            .ok_or_else(|| ApplicationError::NotFound(format!("Experiment {id}")))
    }

    pub async fn list_experiments(&self) -> Result<Vec<Experiment>, ApplicationError> {
        self.registry.list().await
    }

    /// Start a run of a registered experiment
    #[instrument(skip(self), fields(experiment_id = %experiment_id))]
    pub async fn execute(
        &self,
        experiment_id: ExperimentId,
        triggered_by: &str,
    ) -> Result<ExecutionId, ApplicationError> {
        let experiment = self.get_experiment(experiment_id).await?;
        self.executor.execute(experiment, triggered_by).await
    }

    pub async fn get_execution(&self, id: ExecutionId) -> Result<ExecutionRecord, ApplicationError> {
        self.ledger
            .get(id)
            .await?
            .ok_or_else(|| ApplicationError::NotFound(format!("Execution {id}")))
    }

    /// Request an abort; safe to call repeatedly and from any phase
    pub async fn abort(&self, id: ExecutionId, reason: &str) -> Result<AbortAck, ApplicationError> {
        self.executor.abort(id, reason).await
    }

    pub async fn list_executions(
        &self,
        filter: &ExecutionFilter,
    ) -> Result<Vec<ExecutionRecord>, ApplicationError> {
        self.ledger.list(filter).await
    }

    /// History of ledger writes for an execution
    pub async fn execution_events(&self, id: ExecutionId) -> Result<Vec<LedgerEvent>, ApplicationError> {
        self.get_execution(id).await?;
        self.ledger.events(id).await
    }

    /// Block until the execution is terminal
    pub async fn await_execution(&self, id: ExecutionId) -> Result<Execution, ApplicationError> {
        self.executor.await_execution(id).await
    }

    /// Roll back executions left behind by a previous process
    pub async fn recover_orphaned(&self) -> Result<Vec<ExecutionId>, ApplicationError> {
        let recovered = self.executor.recover_orphaned().await?;
        if !recovered.is_empty() {
            warn!(count = recovered.len(), "Recovered orphaned executions");
        }
        Ok(recovered)
    }

    /// Abort every running execution and wait for rollback to finish
    pub async fn shutdown(&self, reason: &str) {
        self.executor.shutdown(reason).await;
    }
}
