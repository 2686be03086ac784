//! Domain entities - Experiments, executions and the records they carry

mod execution;
mod experiment;
mod failure_parameters;
mod injection_handle;
mod ledger_event;
mod metric_sample;
mod safety;
mod success_criterion;
mod validation;

pub use execution::{Execution, ExecutionRecord};
pub use experiment::{Experiment, ExperimentDefinition, MAX_DURATION_SECS, RollbackPlan};
pub use failure_parameters::{DURATION_PARAM, FailureParameters};
pub use injection_handle::{InjectionHandle, RemovalRecord};
pub use ledger_event::{LedgerEvent, LedgerEventKind};
pub use metric_sample::{BaselineMetrics, MetricSample, mean};
pub use safety::{DEFAULT_MAX_BLAST_RADIUS, Guardrail, SafetyChecks, SafetyViolation};
pub use success_criterion::SuccessCriterion;
pub use validation::{CriterionOutcome, CriterionStatus, ValidationResult};
