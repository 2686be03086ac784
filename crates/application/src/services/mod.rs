//! Application services - Use case implementations

mod abort_signal;
mod chaos_service;
mod failure_injector;
mod hypothesis_validator;
mod metrics_collector;
mod phase_executor;
mod recovery_monitor;
mod safety_gate;

pub use abort_signal::AbortSignal;
pub use chaos_service::ChaosService;
pub use failure_injector::FailureInjector;
pub use hypothesis_validator::{CustomPredicate, HypothesisValidator};
pub use metrics_collector::MetricsCollector;
pub use phase_executor::{AbortAck, ExecutorSettings, ORPHAN_REASON, PhaseExecutor};
pub use recovery_monitor::{RecoveryMonitor, RecoveryOutcome};
pub use safety_gate::{PreconditionReport, SafetyGate};
