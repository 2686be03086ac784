//! Phase Executor - Runs an execution through its phases
//!
//! Each execution runs in its own tokio task, tracked in a registry so it
//! can be aborted, awaited and shut down deterministically. Every state
//! change is written to the ledger before the next phase starts.

use std::collections::HashMap;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use domain::{
    ChaosError, DomainError, Execution, ExecutionId, ExecutionStatus, Experiment, LedgerEvent,
    LedgerEventKind, Phase,
};
use futures::StreamExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{Instrument, error, info, info_span, instrument, warn};

use super::abort_signal::AbortSignal;
use super::failure_injector::FailureInjector;
use super::hypothesis_validator::HypothesisValidator;
use super::metrics_collector::MetricsCollector;
use super::recovery_monitor::RecoveryMonitor;
use super::safety_gate::SafetyGate;
use crate::error::ApplicationError;
use crate::ports::{
    DriverRegistry, ExecutionLedgerPort, InfrastructureClient, NotificationEvent, NotifierPort,
    Severity,
};

/// Reason recorded on executions left running by a previous process
pub const ORPHAN_REASON: &str = "orchestrator restarted";

/// Tunables of the phase executor
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorSettings {
    /// Metrics and guardrail sampling interval
    pub poll_interval: Duration,
    /// Upper bound of the recovery wait
    pub recovery_timeout: Duration,
    /// Baseline capture window before injection
    pub baseline_window: Duration,
    /// Orchestrator-wide blast radius ceiling
    pub max_blast_radius: f64,
    /// Deadline of one driver apply or remove, retries included; an apply
    /// past it is still awaited and then rolled back
    pub driver_timeout: Duration,
    /// Deadline of one health or metrics read
    pub call_timeout: Duration,
    pub notify_timeout: Duration,
    pub max_concurrent_executions: usize,
    /// Attempts a driver apply makes, reported on failure
    pub apply_attempts: u32,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            recovery_timeout: Duration::from_secs(300),
            baseline_window: Duration::from_secs(60),
            max_blast_radius: domain::DEFAULT_MAX_BLAST_RADIUS,
            driver_timeout: Duration::from_secs(120),
            call_timeout: Duration::from_secs(10),
            notify_timeout: Duration::from_secs(10),
            max_concurrent_executions: 10,
            apply_attempts: 4,
        }
    }
}

/// Answer to an abort request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbortAck {
    pub execution_id: ExecutionId,
    /// `true` if this request raised the abort flag
    pub accepted: bool,
    pub status: ExecutionStatus,
}

/// Why an execution left the happy path
#[derive(Debug)]
enum Interrupt {
    Aborted(String),
    Failed(ApplicationError),
}

impl From<ApplicationError> for Interrupt {
    fn from(err: ApplicationError) -> Self {
        match err {
            ApplicationError::Timeout(reason) => Self::Aborted(format!("Timed out: {reason}")),
            ApplicationError::Cancelled(reason) => Self::Aborted(reason),
            other => Self::Failed(other),
        }
    }
}

impl From<DomainError> for Interrupt {
    fn from(err: DomainError) -> Self {
        Self::Failed(err.into())
    }
}

impl From<ChaosError> for Interrupt {
    fn from(err: ChaosError) -> Self {
        Self::Failed(err.into())
    }
}

struct RunningExecution {
    abort: AbortSignal,
    done: watch::Receiver<bool>,
    task: JoinHandle<()>,
}

struct ExecutorInner {
    ledger: Arc<dyn ExecutionLedgerPort>,
    notifier: Arc<dyn NotifierPort>,
    gate: SafetyGate,
    injector: FailureInjector,
    collector: MetricsCollector,
    monitor: RecoveryMonitor,
    validator: HypothesisValidator,
    settings: ExecutorSettings,
    running: Mutex<HashMap<ExecutionId, RunningExecution>>,
    /// One permit per allowed concurrent execution
    slots: Arc<Semaphore>,
}

/// Runs executions through the phase state machine
#[derive(Clone)]
pub struct PhaseExecutor {
    inner: Arc<ExecutorInner>,
}

impl std::fmt::Debug for PhaseExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseExecutor")
            .field("settings", &self.inner.settings)
            .field("running", &self.inner.running.lock().len())
            .finish_non_exhaustive()
    }
}

/// Removes the registry entry and wakes waiters when a task ends, even on panic
struct Completion {
    inner: Arc<ExecutorInner>,
    execution_id: ExecutionId,
    done: watch::Sender<bool>,
    _slot: OwnedSemaphorePermit,
}

impl Drop for Completion {
    fn drop(&mut self) {
        self.inner.running.lock().remove(&self.execution_id);
        self.done.send_replace(true);
    }
}

impl PhaseExecutor {
    pub fn new(
        infrastructure: Arc<dyn InfrastructureClient>,
        drivers: DriverRegistry,
        ledger: Arc<dyn ExecutionLedgerPort>,
        notifier: Arc<dyn NotifierPort>,
        validator: HypothesisValidator,
        settings: ExecutorSettings,
    ) -> Self {
        let gate = SafetyGate::new(
            Arc::clone(&infrastructure),
            settings.max_blast_radius,
            settings.call_timeout,
        );
        let injector = FailureInjector::new(
            drivers,
            Arc::clone(&ledger),
            settings.driver_timeout,
            settings.apply_attempts,
        );
        let collector = MetricsCollector::new(
            Arc::clone(&infrastructure),
            settings.poll_interval,
            settings.call_timeout,
        );
        let monitor = RecoveryMonitor::new(
            infrastructure,
            settings.poll_interval,
            settings.recovery_timeout,
            settings.call_timeout,
        );

        Self {
            inner: Arc::new(ExecutorInner {
                ledger,
                notifier,
                gate,
                injector,
                collector,
                monitor,
                validator,
                slots: Arc::new(Semaphore::new(settings.max_concurrent_executions)),
                settings,
                running: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.inner.settings
    }

    /// Number of executions with a live task
    pub fn running_count(&self) -> usize {
        self.inner.running.lock().len()
    }

    pub fn is_running(&self, id: ExecutionId) -> bool {
        self.inner.running.lock().contains_key(&id)
    }

    /// Start an execution and return without waiting for it
    #[instrument(skip(self, experiment), fields(experiment_id = %experiment.id))]
    pub async fn execute(
        &self,
        experiment: Experiment,
        triggered_by: &str,
    ) -> Result<ExecutionId, ApplicationError> {
        let cap = self.inner.settings.max_concurrent_executions;
        let slot = Arc::clone(&self.inner.slots)
            .try_acquire_owned()
            .map_err(|_| ApplicationError::Conflict(format!("{cap} executions already running")))?;

        let execution = Execution::new(experiment.id, triggered_by);
        let execution_id = execution.id;
        self.inner.ledger.insert(&execution).await?;

        let abort = AbortSignal::new();
        let (done_tx, done_rx) = watch::channel(false);
        let span = info_span!(
            "execution",
            execution_id = %execution_id,
            experiment_id = %experiment.id
        );

        // Held across spawn so the task cannot deregister before it is registered
        let mut running = self.inner.running.lock();
        let completion = Completion {
            inner: Arc::clone(&self.inner),
            execution_id,
            done: done_tx,
            _slot: slot,
        };
        let task = tokio::spawn(
            Arc::clone(&self.inner)
                .run(experiment, execution, abort.clone(), completion)
                .instrument(span),
        );
        running.insert(
            execution_id,
            RunningExecution {
                abort,
                done: done_rx,
                task,
            },
        );
        drop(running);

        info!(execution_id = %execution_id, "Execution started");
        Ok(execution_id)
    }

    /// Request an abort; repeated requests are acknowledged without effect
    #[instrument(skip(self, reason), fields(execution_id = %execution_id))]
    pub async fn abort(
        &self,
        execution_id: ExecutionId,
        reason: &str,
    ) -> Result<AbortAck, ApplicationError> {
        let signal = self
            .inner
            .running
            .lock()
            .get(&execution_id)
            .map(|r| r.abort.clone());

        if let Some(signal) = signal {
            let accepted = signal.trigger(reason);
            info!(accepted, reason, "Abort requested");
            return Ok(AbortAck {
                execution_id,
                accepted,
                status: ExecutionStatus::Running,
            });
        }

        let execution = self
            .inner
            .ledger
            .get(execution_id)
            .await?
            .ok_or_else(|| ApplicationError::NotFound(format!("Execution {execution_id}")))?;
        Ok(AbortAck {
            execution_id,
            accepted: false,
            status: execution.status,
        })
    }

    /// Wait until the execution's task has finished and return its record
    pub async fn await_execution(&self, execution_id: ExecutionId) -> Result<Execution, ApplicationError> {
        let done = self
            .inner
            .running
            .lock()
            .get(&execution_id)
            .map(|r| r.done.clone());

        if let Some(mut done) = done {
            // An error means the sender is gone, which also means the task ended
            let _ = done.wait_for(|finished| *finished).await;
        }

        self.inner
            .ledger
            .get(execution_id)
            .await?
            .ok_or_else(|| ApplicationError::NotFound(format!("Execution {execution_id}")))
    }

    /// Roll back executions a previous process left unfinished
    ///
    /// Removes every open handle, marks the execution FAILED and releases
    /// its locks. Executions with a live task here are skipped.
    #[instrument(skip(self))]
    pub async fn recover_orphaned(&self) -> Result<Vec<ExecutionId>, ApplicationError> {
        let active = self.inner.ledger.list_active().await?;
        let mut recovered = Vec::new();

        for mut execution in active {
            if self.is_running(execution.id) {
                continue;
            }
            warn!(execution_id = %execution.id, phase = %execution.current_phase, "Recovering orphaned execution");

            self.inner.injector.remove_all(&mut execution).await;
            let (reason, severity) = rollback_outcome(ORPHAN_REASON, &execution, None);
            execution.fail(reason)?;
            self.inner.close(&execution, severity).await;
            recovered.push(execution.id);
        }

        Ok(recovered)
    }

    /// Abort every running execution and wait for their tasks
    #[instrument(skip(self))]
    pub async fn shutdown(&self, reason: &str) {
        let tasks: Vec<(ExecutionId, JoinHandle<()>)> = {
            let mut running = self.inner.running.lock();
            running
                .drain()
                .map(|(id, entry)| {
                    entry.abort.trigger(reason);
                    (id, entry.task)
                })
                .collect()
        };

        info!(count = tasks.len(), "Shutting down executions");
        for (id, task) in tasks {
            if let Err(e) = task.await {
                error!(execution_id = %id, error = %e, "Execution task ended abnormally");
            }
        }
    }
}

impl ExecutorInner {
    async fn run(
        self: Arc<Self>,
        experiment: Experiment,
        mut execution: Execution,
        abort: AbortSignal,
        completion: Completion,
    ) {
        let outcome = self.drive(&experiment, &mut execution, &abort).await;
        self.finalize(&experiment, &mut execution, outcome).await;
        drop(completion);
    }

    async fn drive(
        &self,
        experiment: &Experiment,
        execution: &mut Execution,
        abort: &AbortSignal,
    ) -> Result<Option<bool>, Interrupt> {
        let targets = experiment.targets();

        // PREPARATION
        check_abort(abort)?;
        self.ledger
            .acquire_locks(execution.id, &targets)
            .await
            .map_err(|e| match e {
                ApplicationError::Conflict(msg) => {
                    Interrupt::from(ChaosError::PreconditionFailed(msg))
                },
                other => Interrupt::from(other),
            })?;

        let report = guarded(abort, self.gate.check_preconditions(experiment)).await??;
        let baseline = guarded(
            abort,
            self.collector.baseline(&targets, self.settings.baseline_window),
        )
        .await?;
        self.record_result(
            execution,
            Phase::Preparation,
            json!({
                "baseline": baseline,
                "total_eligible_resources": report.total_eligible_resources,
                "max_blast_radius": report.max_blast_radius,
                "max_targets": report.max_targets,
                "blast_radius": report.blast_radius,
                "targets_verified_healthy": true,
            }),
        )
        .await?;
        self.enter(execution, Phase::Injection).await?;

        // INJECTION
        check_abort(abort)?;
        let handle = self.injector.inject(execution, experiment).await?;
        self.record_result(
            execution,
            Phase::Injection,
            json!({
                "handle_id": handle.id,
                "affected_resources": handle.targets,
                "parameters": handle.parameters,
                "applied_at": handle.applied_at,
            }),
        )
        .await?;
        check_abort(abort)?;
        self.enter(execution, Phase::Observation).await?;

        // OBSERVATION
        let mut samples = pin!(self.collector.stream(targets.clone(), experiment.duration()));
        let mut taken = 0usize;
        loop {
            let next = tokio::select! {
                biased;
                reason = abort.cancelled() => return Err(Interrupt::Aborted(reason)),
                next = samples.next() => next,
            };
            let Some(sample) = next else { break };
            taken += 1;

            let violation = self.gate.check_sample(&experiment.safety_checks, &sample);
            let sequence = sample.sequence;
            execution.record_metric(sample)?;
            self.write(execution, LedgerEventKind::MetricSampled { sequence })
                .await?;

            if let Some(violation) = violation {
                self.record_result(
                    execution,
                    Phase::Observation,
                    json!({
                        "samples": taken,
                        "guardrail_breaches": [violation],
                        "data_completeness": completeness(execution),
                    }),
                )
                .await?;
                return Err(Interrupt::Aborted(
                    ChaosError::SafetyViolation(violation.to_string()).to_string(),
                ));
            }
        }
        self.record_result(
            execution,
            Phase::Observation,
            json!({
                "samples": taken,
                "guardrail_breaches": [],
                "data_completeness": completeness(execution),
            }),
        )
        .await?;
        self.enter(execution, Phase::Recovery).await?;

        // RECOVERY
        let failures = self.injector.remove_all(execution).await;
        if let Some(first) = failures.into_iter().next() {
            return Err(first.into());
        }
        let outcome = guarded(abort, self.monitor.wait_for_recovery(&targets)).await?;
        if !outcome.recovered {
            let shortfall = ChaosError::RecoveryTimeout {
                waited_secs: outcome.recovery_duration.as_secs(),
            };
            warn!(error = %shortfall, "Continuing to validation without recovery");
        }
        self.record_result(
            execution,
            Phase::Recovery,
            json!({
                "recovery_successful": outcome.recovered,
                "recovery_duration_secs": outcome.recovery_duration.as_secs_f64(),
                "polls": outcome.polls,
                "removed_handles": execution.removals.iter().filter(|r| r.success).map(|r| r.handle_id).collect::<Vec<_>>(),
            }),
        )
        .await?;
        self.enter(execution, Phase::Validation).await?;

        // VALIDATION
        let result = self.validator.validate(experiment, execution);
        let validated = result.hypothesis_validated;
        let detail = serde_json::to_value(&result)
            .map_err(|e| ApplicationError::Internal(format!("validation result: {e}")))?;
        self.record_result(execution, Phase::Validation, detail).await?;

        Ok(validated)
    }

    async fn finalize(
        &self,
        experiment: &Experiment,
        execution: &mut Execution,
        outcome: Result<Option<bool>, Interrupt>,
    ) {
        let terminal = match outcome {
            Ok(validated) => execution
                .complete(validated)
                .map(|()| Severity::Info)
                .or_else(|e| {
                    error!(error = %e, "Could not complete execution");
                    execution.fail(e.to_string()).map(|()| Severity::Critical)
                }),
            Err(Interrupt::Aborted(reason)) => {
                self.injector.remove_all(execution).await;
                if execution.unresolved_handles().is_empty() {
                    warn!(reason = %reason, "Execution aborted");
                    execution.abort(reason).map(|()| Severity::Warning)
                } else {
                    let (reason, severity) = rollback_outcome(&reason, execution, Some(experiment));
                    execution.fail(reason).map(|()| severity)
                }
            },
            Err(Interrupt::Failed(err)) => {
                self.injector.remove_all(execution).await;
                let (reason, severity) = rollback_outcome(&err.to_string(), execution, Some(experiment));
                error!(error = %err, "Execution failed");
                execution.fail(reason).map(|()| severity)
            },
        };

        match terminal {
            Ok(severity) => self.close(execution, severity).await,
            Err(e) => error!(error = %e, "Execution already terminal"),
        }
    }

    /// Persist the terminal state, release locks and notify
    async fn close(&self, execution: &Execution, severity: Severity) {
        let event = LedgerEvent::new(
            execution,
            LedgerEventKind::Finished {
                status: execution.status,
            },
        );
        // Locks stay with a record that still reads as running until orphan recovery
        if let Err(e) = self.ledger.record(execution, &event).await {
            error!(
                execution_id = %execution.id,
                error = %e,
                "Could not persist terminal state, keeping resource locks"
            );
        } else if let Err(e) = self.ledger.release_locks(execution.id).await {
            error!(execution_id = %execution.id, error = %e, "Could not release resource locks");
        }

        info!(
            execution_id = %execution.id,
            status = %execution.status,
            validated = ?execution.hypothesis_validated,
            reason = execution.error_message.as_deref().unwrap_or(""),
            "Execution finished"
        );

        let notification = NotificationEvent::for_execution(execution, severity);
        match timeout(self.settings.notify_timeout, self.notifier.notify(&notification)).await {
            Ok(Ok(())) => {},
            Ok(Err(e)) => warn!(execution_id = %execution.id, error = %e, "Notification failed"),
            Err(_) => warn!(execution_id = %execution.id, "Notification timed out"),
        }
    }

    async fn enter(&self, execution: &mut Execution, phase: Phase) -> Result<(), Interrupt> {
        execution.advance(phase)?;
        info!(phase = %phase, "Entering phase");
        self.write(execution, LedgerEventKind::PhaseEntered { phase }).await
    }

    async fn record_result(
        &self,
        execution: &mut Execution,
        phase: Phase,
        detail: serde_json::Value,
    ) -> Result<(), Interrupt> {
        execution.record_phase_result(phase, detail)?;
        self.write(execution, LedgerEventKind::PhaseResultRecorded { phase })
            .await
    }

    async fn write(&self, execution: &Execution, kind: LedgerEventKind) -> Result<(), Interrupt> {
        let event = LedgerEvent::new(execution, kind);
        self.ledger.record(execution, &event).await?;
        Ok(())
    }
}

/// Reason and severity after a rollback attempt
fn rollback_outcome(
    reason: &str,
    execution: &Execution,
    experiment: Option<&Experiment>,
) -> (String, Severity) {
    let unresolved = execution.unresolved_handles();
    if unresolved.is_empty() {
        return (reason.to_string(), Severity::Warning);
    }
    let ids: Vec<String> = unresolved.iter().map(ToString::to_string).collect();
    let mut message = format!(
        "{reason}; {} injection(s) need manual intervention: {}",
        ids.len(),
        ids.join(", ")
    );
    if let Some(steps) = experiment.and_then(|e| e.rollback_plan.summary()) {
        message.push_str(&format!("; rollback plan: {steps}"));
    }
    (message, Severity::Critical)
}

fn check_abort(abort: &AbortSignal) -> Result<(), Interrupt> {
    abort.reason().map_or(Ok(()), |reason| Err(Interrupt::Aborted(reason)))
}

/// Run `work` unless the abort flag is raised first
async fn guarded<T>(abort: &AbortSignal, work: impl Future<Output = T>) -> Result<T, Interrupt> {
    tokio::select! {
        biased;
        reason = abort.cancelled() => Err(Interrupt::Aborted(reason)),
        out = work => Ok(out),
    }
}

fn completeness(execution: &Execution) -> f64 {
    domain::mean(
        execution
            .metrics_collected
            .iter()
            .map(domain::MetricSample::completeness),
    )
    .unwrap_or(0.0)
}
