//! Failure Injector - Applies failures through drivers and removes them again

use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use domain::{
    ChaosError, Execution, Experiment, InjectionHandle, LedgerEvent, LedgerEventKind,
    RemovalRecord,
};
use tokio::time::timeout;
use tracing::{error, info, instrument, warn};

use crate::error::ApplicationError;
use crate::ports::{DriverRegistry, ExecutionLedgerPort};

/// Drives failure drivers and records every handle and removal
pub struct FailureInjector {
    drivers: DriverRegistry,
    ledger: Arc<dyn ExecutionLedgerPort>,
    call_timeout: Duration,
    /// Attempts a driver makes before giving up, for error reporting
    apply_attempts: u32,
}

impl std::fmt::Debug for FailureInjector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailureInjector")
            .field("drivers", &self.drivers)
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}

impl FailureInjector {
    pub fn new(
        drivers: DriverRegistry,
        ledger: Arc<dyn ExecutionLedgerPort>,
        call_timeout: Duration,
        apply_attempts: u32,
    ) -> Self {
        Self {
            drivers,
            ledger,
            call_timeout,
            apply_attempts: apply_attempts.max(1),
        }
    }

    /// Apply the experiment's failure and persist the handle
    ///
    /// The handle is in the ledger before this returns. Any driver error
    /// becomes [`ChaosError::InjectionFailed`]. An apply that outlives the
    /// call timeout is still awaited to completion; a handle it returns late
    /// is recorded so it can be removed, and the overrun is reported as
    /// [`ApplicationError::Timeout`].
    #[instrument(skip_all, fields(execution_id = %execution.id, failure_type = %experiment.failure_type))]
    pub async fn inject(
        &self,
        execution: &mut Execution,
        experiment: &Experiment,
    ) -> Result<InjectionHandle, ApplicationError> {
        let driver = self.drivers.get(experiment.failure_type)?;
        let targets = experiment.targets();
        let parameters = driver.clamp_parameters(&experiment.driver_parameters());

        let mut apply = pin!(driver.apply(&targets, &parameters));
        let handle = match timeout(self.call_timeout, &mut apply).await {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => return Err(self.injection_failed(experiment, &e)),
            Err(_) => {
                let waited = self.call_timeout.as_secs();
                warn!(timeout_secs = waited, "Injection overran its deadline, waiting for the driver");
                let overrun = ApplicationError::Timeout(format!(
                    "injection of {} did not finish within {waited}s",
                    experiment.failure_type
                ));
                match apply.await {
                    Ok(handle) => {
                        self.persist_handle(execution, &handle).await?;
                        warn!(handle_id = %handle.id, "Late injection recorded for removal");
                    },
                    Err(e) => warn!(error = %e, "Late injection failed"),
                }
                return Err(overrun);
            },
        };

        self.persist_handle(execution, &handle).await?;
        info!(handle_id = %handle.id, targets = handle.targets.len(), "Failure applied");
        Ok(handle)
    }

    fn injection_failed(&self, experiment: &Experiment, e: &ApplicationError) -> ApplicationError {
        let attempts = if e.is_retryable() { self.apply_attempts } else { 1 };
        warn!(error = %e, attempts, "Injection failed");
        ChaosError::InjectionFailed {
            failure_type: experiment.failure_type,
            attempts,
            reason: e.to_string(),
        }
        .into()
    }

    async fn persist_handle(
        &self,
        execution: &mut Execution,
        handle: &InjectionHandle,
    ) -> Result<(), ApplicationError> {
        execution.record_handle(handle.clone())?;
        let event = LedgerEvent::new(
            execution,
            LedgerEventKind::InjectionRecorded {
                handle_id: handle.id,
            },
        );
        self.ledger.record(execution, &event).await
    }

    /// Remove every handle of the execution that has no removal attempt yet
    ///
    /// Each handle gets exactly one attempt; failures are flagged for manual
    /// intervention and returned, and never stop the remaining removals.
    #[instrument(skip_all, fields(execution_id = %execution.id))]
    pub async fn remove_all(&self, execution: &mut Execution) -> Vec<ChaosError> {
        let pending: Vec<InjectionHandle> = execution.pending_removal().into_iter().cloned().collect();
        let mut failures = Vec::new();

        for handle in pending {
            let record = match self.remove_one(&handle).await {
                Ok(()) => {
                    info!(handle_id = %handle.id, "Failure removed");
                    RemovalRecord::succeeded(handle.id)
                },
                Err(reason) => {
                    error!(handle_id = %handle.id, reason = %reason, "Removal failed, manual intervention required");
                    failures.push(ChaosError::RemovalFailed {
                        handle_id: handle.id,
                        reason: reason.clone(),
                    });
                    RemovalRecord::failed(handle.id, reason)
                },
            };

            let event = LedgerEvent::new(
                execution,
                LedgerEventKind::RemovalRecorded {
                    handle_id: record.handle_id,
                    success: record.success,
                },
            );
            if let Err(e) = execution.record_removal(record) {
                error!(error = %e, "Could not record removal");
                continue;
            }
            if let Err(e) = self.ledger.record(execution, &event).await {
                error!(error = %e, "Could not persist removal");
            }
        }

        failures
    }

    async fn remove_one(&self, handle: &InjectionHandle) -> Result<(), String> {
        let driver = self
            .drivers
            .get(handle.failure_type)
            .map_err(|e| e.to_string())?;
        match timeout(self.call_timeout, driver.remove(handle)).await {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(_) => Err(format!("timed out after {}s", self.call_timeout.as_secs())),
        }
    }
}
