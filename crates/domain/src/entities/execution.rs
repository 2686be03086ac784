//! Execution - One run of an experiment through the phase state machine

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::injection_handle::{InjectionHandle, RemovalRecord};
use super::metric_sample::MetricSample;
use crate::errors::DomainError;
use crate::value_objects::{ExecutionId, ExecutionStatus, ExperimentId, InjectionId, Phase};

/// A single run of an experiment
///
/// Only the phase executor mutates an execution. Once the status is
/// terminal every mutator returns [`DomainError::AlreadyTerminal`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub id: ExecutionId,
    pub experiment_id: ExperimentId,
    /// Who or what started the run
    pub triggered_by: String,
    pub status: ExecutionStatus,
    /// Phase the run is in, or was in when it terminated
    pub current_phase: Phase,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Detail recorded when each phase finished
    pub phase_results: BTreeMap<Phase, Value>,
    /// Observation samples, in sequence order
    pub metrics_collected: Vec<MetricSample>,
    /// `None` while running or when inconclusive
    pub hypothesis_validated: Option<bool>,
    /// Human-readable reason for FAILED or ABORTED
    pub error_message: Option<String>,
    pub injection_handles: Vec<InjectionHandle>,
    pub removals: Vec<RemovalRecord>,
}

/// Execution as stored and returned by the ledger
pub type ExecutionRecord = Execution;

impl Execution {
    /// Start a new execution in PREPARATION
    pub fn new(experiment_id: ExperimentId, triggered_by: impl Into<String>) -> Self {
        Self {
            id: ExecutionId::new(),
            experiment_id,
            triggered_by: triggered_by.into(),
            status: ExecutionStatus::Running,
            current_phase: Phase::Preparation,
            started_at: Utc::now(),
            completed_at: None,
            phase_results: BTreeMap::new(),
            metrics_collected: Vec::new(),
            hypothesis_validated: None,
            error_message: None,
            injection_handles: Vec::new(),
            removals: Vec::new(),
        }
    }

    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// The terminal status if finished, otherwise the current phase
    pub const fn state_label(&self) -> &'static str {
        if self.status.is_terminal() {
            self.status.as_str()
        } else {
            self.current_phase.as_str()
        }
    }

    /// Move to the next phase; phases can only be entered in order
    pub fn advance(&mut self, next: Phase) -> Result<(), DomainError> {
        self.ensure_running()?;
        if self.current_phase.next() != Some(next) {
            return Err(DomainError::InvalidTransition {
                from: self.current_phase,
                to: next,
            });
        }
        self.current_phase = next;
        Ok(())
    }

    pub fn record_phase_result(&mut self, phase: Phase, detail: Value) -> Result<(), DomainError> {
        self.ensure_running()?;
        self.phase_results.insert(phase, detail);
        Ok(())
    }

    pub fn record_metric(&mut self, sample: MetricSample) -> Result<(), DomainError> {
        self.ensure_running()?;
        self.metrics_collected.push(sample);
        Ok(())
    }

    pub fn record_handle(&mut self, handle: InjectionHandle) -> Result<(), DomainError> {
        self.ensure_running()?;
        self.injection_handles.push(handle);
        Ok(())
    }

    pub fn record_removal(&mut self, record: RemovalRecord) -> Result<(), DomainError> {
        self.ensure_running()?;
        self.removals.push(record);
        Ok(())
    }

    /// Whether a handle has a successful removal on record
    pub fn is_removed(&self, handle_id: InjectionId) -> bool {
        self.removals
            .iter()
            .any(|r| r.handle_id == handle_id && r.success)
    }

    /// Handles still lacking a successful removal
    pub fn open_handles(&self) -> Vec<&InjectionHandle> {
        self.injection_handles
            .iter()
            .filter(|h| !self.is_removed(h.id))
            .collect()
    }

    /// Handles that have never had a removal attempted
    pub fn pending_removal(&self) -> Vec<&InjectionHandle> {
        self.injection_handles
            .iter()
            .filter(|h| !self.removals.iter().any(|r| r.handle_id == h.id))
            .collect()
    }

    /// Handles whose last removal failed and need an operator
    pub fn unresolved_handles(&self) -> Vec<InjectionId> {
        self.injection_handles
            .iter()
            .filter(|h| {
                !self.is_removed(h.id)
                    && self
                        .removals
                        .iter()
                        .any(|r| r.handle_id == h.id && r.manual_intervention)
            })
            .map(|h| h.id)
            .collect()
    }

    /// Finish after validation; requires every handle to be removed
    pub fn complete(&mut self, hypothesis_validated: Option<bool>) -> Result<(), DomainError> {
        self.ensure_running()?;
        if self.current_phase != Phase::Validation {
            return Err(DomainError::ValidationError(format!(
                "cannot complete from phase {}",
                self.current_phase
            )));
        }
        let open = self.open_handles().len();
        if open > 0 {
            return Err(DomainError::OpenInjections(open));
        }
        self.hypothesis_validated = hypothesis_validated;
        self.finish(ExecutionStatus::Completed, None);
        Ok(())
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), DomainError> {
        self.ensure_running()?;
        self.finish(ExecutionStatus::Failed, Some(reason.into()));
        Ok(())
    }

    pub fn abort(&mut self, reason: impl Into<String>) -> Result<(), DomainError> {
        self.ensure_running()?;
        self.finish(ExecutionStatus::Aborted, Some(reason.into()));
        Ok(())
    }

    /// Wall-clock run time, once finished
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        self.completed_at.map(|end| end - self.started_at)
    }

    fn finish(&mut self, status: ExecutionStatus, reason: Option<String>) {
        self.status = status;
        self.error_message = reason;
        self.completed_at = Some(Utc::now());
    }

    fn ensure_running(&self) -> Result<(), DomainError> {
        if self.status.is_terminal() {
            return Err(DomainError::AlreadyTerminal(self.status));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::FailureParameters;
    use crate::value_objects::{FailureType, ResourceId};
    use serde_json::json;

    fn execution() -> Execution {
        Execution::new(ExperimentId::new(), "tests")
    }

    fn handle() -> InjectionHandle {
        InjectionHandle::new(
            FailureType::InstanceTermination,
            vec![ResourceId::new("i-1").unwrap()],
            FailureParameters::new(),
            Value::Null,
        )
    }

    fn walk_to_validation(e: &mut Execution) {
        for phase in &Phase::ORDER[1..] {
            e.advance(*phase).unwrap();
        }
    }

    #[test]
    fn new_execution_is_preparing() {
        let e = execution();
        assert_eq!(e.status, ExecutionStatus::Running);
        assert_eq!(e.current_phase, Phase::Preparation);
        assert_eq!(e.state_label(), "preparation");
        assert!(e.completed_at.is_none());
    }

    #[test]
    fn phases_cannot_be_skipped() {
        let mut e = execution();
        let err = e.advance(Phase::Observation).unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { .. }));
        assert_eq!(e.current_phase, Phase::Preparation);
    }

    #[test]
    fn phases_cannot_go_back() {
        let mut e = execution();
        e.advance(Phase::Injection).unwrap();
        assert!(e.advance(Phase::Preparation).is_err());
    }

    #[test]
    fn complete_requires_validation_phase() {
        let mut e = execution();
        assert!(e.complete(Some(true)).is_err());
    }

    #[test]
    fn complete_requires_all_handles_removed() {
        let mut e = execution();
        let h = handle();
        let id = h.id;
        e.record_handle(h).unwrap();
        walk_to_validation(&mut e);

        assert!(matches!(e.complete(Some(true)), Err(DomainError::OpenInjections(1))));

        e.record_removal(RemovalRecord::succeeded(id)).unwrap();
        e.complete(Some(true)).unwrap();
        assert_eq!(e.status, ExecutionStatus::Completed);
        assert_eq!(e.hypothesis_validated, Some(true));
        assert!(e.completed_at.is_some());
    }

    #[test]
    fn failed_removal_keeps_handle_open() {
        let mut e = execution();
        let h = handle();
        let id = h.id;
        e.record_handle(h).unwrap();
        e.record_removal(RemovalRecord::failed(id, "boom")).unwrap();

        assert_eq!(e.open_handles().len(), 1);
        assert!(e.pending_removal().is_empty());
        assert_eq!(e.unresolved_handles(), vec![id]);
    }

    #[test]
    fn terminal_status_never_regresses() {
        let mut e = execution();
        e.abort("operator").unwrap();

        assert!(matches!(e.fail("late"), Err(DomainError::AlreadyTerminal(ExecutionStatus::Aborted))));
        assert!(e.advance(Phase::Injection).is_err());
        assert!(e.record_phase_result(Phase::Preparation, json!({})).is_err());
        assert_eq!(e.status, ExecutionStatus::Aborted);
        assert_eq!(e.error_message.as_deref(), Some("operator"));
        assert_eq!(e.state_label(), "aborted");
    }

    #[test]
    fn partial_results_survive_failure() {
        let mut e = execution();
        e.record_phase_result(Phase::Preparation, json!({"blast_radius": 0.1}))
            .unwrap();
        e.fail("driver exploded").unwrap();
        assert!(e.phase_results.contains_key(&Phase::Preparation));
    }

    #[test]
    fn record_serializes_phase_keys_as_names() {
        let mut e = execution();
        e.record_phase_result(Phase::Preparation, json!({"ok": true}))
            .unwrap();
        let value = serde_json::to_value(&e).unwrap();
        assert_eq!(value["phase_results"]["preparation"]["ok"], json!(true));
        assert_eq!(value["status"], json!("running"));
    }
}
