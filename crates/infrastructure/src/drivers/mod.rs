//! Failure drivers
//!
//! One driver per failure type. Network, termination and availability
//! faults go through the control plane; resource stress runs on the target
//! hosts through the agent transport.
//!
//! Applying is all or nothing: when a target fails, targets already hit are
//! undone before the error is returned.

mod instance_termination;
mod network;
mod service_unavailable;
mod stress;

use std::sync::Arc;

use application::ports::{DriverRegistry, FailureDriver, InfrastructureClient, RemoteCommandPort};
use application::ApplicationError;
use domain::{InjectionHandle, ResourceId};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::error;

pub use instance_termination::InstanceTerminationDriver;
pub use network::NetworkFaultDriver;
pub use service_unavailable::ServiceUnavailableDriver;
pub use stress::StressDriver;

use crate::adapters::RetryingDriver;
use crate::config::DriverLimits;
use crate::retry::RetryConfig;

/// Registry with a driver for every failure type, each behind `retry`
pub fn standard_registry(
    infrastructure: &Arc<dyn InfrastructureClient>,
    agent: &Arc<dyn RemoteCommandPort>,
    limits: &DriverLimits,
    retry: &RetryConfig,
) -> DriverRegistry {
    let drivers: [Arc<dyn FailureDriver>; 8] = [
        Arc::new(InstanceTerminationDriver::new(Arc::clone(infrastructure))),
        Arc::new(NetworkFaultDriver::latency(Arc::clone(infrastructure), limits)),
        Arc::new(NetworkFaultDriver::partition(Arc::clone(infrastructure), limits)),
        Arc::new(NetworkFaultDriver::dependency_timeout(Arc::clone(infrastructure), limits)),
        Arc::new(ServiceUnavailableDriver::new(Arc::clone(infrastructure))),
        Arc::new(StressDriver::cpu(Arc::clone(agent), limits)),
        Arc::new(StressDriver::memory(Arc::clone(agent), limits)),
        Arc::new(StressDriver::disk(Arc::clone(agent), limits)),
    ];

    drivers.into_iter().fold(DriverRegistry::new(), |registry, driver| {
        registry.with_driver(Arc::new(RetryingDriver::new(driver, retry.clone())))
    })
}

/// Run `apply` on each target in order, undoing earlier targets on failure
pub(crate) async fn apply_each<T, A, AF, U, UF>(
    targets: &[ResourceId],
    mut apply: A,
    mut undo: U,
) -> Result<Vec<(ResourceId, T)>, ApplicationError>
where
    A: FnMut(ResourceId) -> AF,
    AF: Future<Output = Result<T, ApplicationError>>,
    U: FnMut(ResourceId, T) -> UF,
    UF: Future<Output = Result<(), ApplicationError>>,
{
    let mut applied = Vec::with_capacity(targets.len());

    for target in targets {
        match apply(target.clone()).await {
            Ok(value) => applied.push((target.clone(), value)),
            Err(err) => {
                for (resource, value) in applied.into_iter().rev() {
                    if let Err(undo_err) = undo(resource.clone(), value).await {
                        error!(
                            resource = %resource,
                            error = %undo_err,
                            "Undo after failed apply did not succeed, manual intervention required"
                        );
                    }
                }
                return Err(err);
            },
        }
    }

    Ok(applied)
}

/// Fold per-target removal errors into one
pub(crate) fn removal_result(total: usize, failures: Vec<String>) -> Result<(), ApplicationError> {
    if failures.is_empty() {
        return Ok(());
    }
    Err(ApplicationError::ExternalService(format!(
        "{} of {total} targets still affected: {}",
        failures.len(),
        failures.join("; ")
    )))
}

pub(crate) fn encode_state<T: Serialize>(state: &T) -> Result<Value, ApplicationError> {
    serde_json::to_value(state)
        .map_err(|e| ApplicationError::Internal(format!("Failed to encode driver state: {e}")))
}

pub(crate) fn decode_state<T: DeserializeOwned>(handle: &InjectionHandle) -> Result<T, ApplicationError> {
    serde_json::from_value(handle.driver_state.clone()).map_err(|e| {
        ApplicationError::Internal(format!("Corrupt driver state on handle {}: {e}", handle.id))
    })
}

/// Round a clamped parameter to a whole, non-negative number
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub(crate) fn whole(value: f64) -> u64 {
    value.round().max(0.0) as u64
}

#[cfg(test)]
mod tests {
    use domain::FailureType;

    use super::*;
    use crate::testing::{MockAgent, MockInfrastructure, resources};

    #[test]
    fn registry_covers_every_failure_type() {
        let infrastructure: Arc<dyn InfrastructureClient> = Arc::new(MockInfrastructure::new());
        let agent: Arc<dyn RemoteCommandPort> = Arc::new(MockAgent::new());

        let registry = standard_registry(
            &infrastructure,
            &agent,
            &DriverLimits::default(),
            &RetryConfig::driver(),
        );
        assert_eq!(registry.len(), FailureType::ALL.len());
        for failure_type in FailureType::ALL {
            assert_eq!(registry.get(failure_type).unwrap().failure_type(), failure_type);
        }
    }

    #[tokio::test]
    async fn apply_each_undoes_in_reverse_on_failure() {
        let undone = parking_lot::Mutex::new(Vec::new());
        let undone_ref = &undone;

        let result = apply_each(
            &resources(&["a", "b", "c"]),
            |r| async move {
                if r.as_str() == "c" {
                    Err(ApplicationError::ExternalService("boom".into()))
                } else {
                    Ok(r.to_string())
                }
            },
            move |r, _| async move {
                undone_ref.lock().push(r.to_string());
                Ok(())
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(*undone.lock(), ["b", "a"]);
    }

    #[test]
    fn removal_result_summarises_failures() {
        assert!(removal_result(3, Vec::new()).is_ok());
        let err = removal_result(3, vec!["b: 503".into()]).unwrap_err();
        assert!(err.to_string().contains("1 of 3 targets still affected"));
    }

    #[test]
    fn whole_rounds_and_floors_at_zero() {
        assert_eq!(whole(249.6), 250);
        assert_eq!(whole(-3.0), 0);
    }
}
