//! Instance termination driver
//!
//! Terminated instances cannot be brought back. Removal only confirms the
//! handle; recovery is up to the platform replacing the instances, which
//! the recovery monitor observes.
//!
//! Because termination cannot be undone, a failed apply remembers the
//! instances it already terminated. A later apply over the same targets
//! (a retry) skips them and reports them in its handle.

use std::sync::Arc;

use application::ports::{FailureDriver, InfrastructureClient};
use application::ApplicationError;
use async_trait::async_trait;
use domain::{FailureParameters, FailureType, InjectionHandle, ResourceId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument};

use super::{decode_state, encode_state};

#[derive(Debug, Serialize, Deserialize)]
struct TerminationState {
    terminated: Vec<ResourceId>,
}

pub struct InstanceTerminationDriver {
    infrastructure: Arc<dyn InfrastructureClient>,
    /// Terminated by a failed apply and not yet reported in a handle
    unreported: Mutex<Vec<ResourceId>>,
}

impl std::fmt::Debug for InstanceTerminationDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceTerminationDriver")
            .field("unreported", &self.unreported.lock().len())
            .finish_non_exhaustive()
    }
}

impl InstanceTerminationDriver {
    pub fn new(infrastructure: Arc<dyn InfrastructureClient>) -> Self {
        Self {
            infrastructure,
            unreported: Mutex::new(Vec::new()),
        }
    }

    fn already_terminated(&self, target: &ResourceId) -> bool {
        self.unreported.lock().contains(target)
    }
}

#[async_trait]
impl FailureDriver for InstanceTerminationDriver {
    fn failure_type(&self) -> FailureType {
        FailureType::InstanceTermination
    }

    fn clamp_parameters(&self, parameters: &FailureParameters) -> FailureParameters {
        parameters.clone()
    }

    #[instrument(skip_all, fields(targets = targets.len()))]
    async fn apply(
        &self,
        targets: &[ResourceId],
        parameters: &FailureParameters,
    ) -> Result<InjectionHandle, ApplicationError> {
        let mut terminated = Vec::with_capacity(targets.len());

        for target in targets {
            if self.already_terminated(target) {
                debug!(target = %target, "Terminated by an earlier attempt, skipping");
                terminated.push(target.clone());
                continue;
            }
            if let Err(err) = self.infrastructure.terminate_resource(target).await {
                if terminated.is_empty() {
                    return Err(err);
                }
                error!(
                    failed = %target,
                    terminated = ?terminated,
                    "Termination stopped part way, terminated instances cannot be restored"
                );
                let mut unreported = self.unreported.lock();
                for resource in &terminated {
                    if !unreported.contains(resource) {
                        unreported.push(resource.clone());
                    }
                }
                let names: Vec<&str> = terminated.iter().map(ResourceId::as_str).collect();
                return Err(err.with_context(&format!("already terminated: {}", names.join(", "))));
            }
            terminated.push(target.clone());
        }

        self.unreported.lock().retain(|r| !terminated.contains(r));
        info!(count = terminated.len(), "Instances terminated");
        let state = encode_state(&TerminationState {
            terminated: terminated.clone(),
        })?;
        Ok(InjectionHandle::new(
            FailureType::InstanceTermination,
            terminated,
            parameters.clone(),
            state,
        ))
    }

    async fn remove(&self, handle: &InjectionHandle) -> Result<(), ApplicationError> {
        let state: TerminationState = decode_state(handle)?;
        debug!(
            handle_id = %handle.id,
            count = state.terminated.len(),
            "Nothing to undo for terminated instances, awaiting replacement"
        );
        Ok(())
    }
}
