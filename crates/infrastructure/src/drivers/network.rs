//! Network fault driver
//!
//! Latency, partition and dependency timeouts are all control plane rules
//! attached to a resource. The handle keeps every rule id so removal can
//! detach exactly what was applied.

use std::sync::Arc;

use application::ports::{FailureDriver, InfrastructureClient, NetworkFault};
use application::ApplicationError;
use async_trait::async_trait;
use domain::{FailureParameters, FailureType, InjectionHandle, ResourceId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};

use super::{apply_each, decode_state, encode_state, removal_result, whole};
use crate::config::DriverLimits;

pub const LATENCY_PARAM: &str = "latency_ms";
pub const JITTER_PARAM: &str = "jitter_ms";
pub const PEERS_PARAM: &str = "peers";
pub const DEPENDENCY_PARAM: &str = "dependency";
pub const DELAY_PARAM: &str = "delay_ms";

#[derive(Debug, Serialize, Deserialize)]
struct AppliedRule {
    resource: ResourceId,
    rule_id: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct NetworkState {
    rules: Vec<AppliedRule>,
}

/// Driver for the control plane's network rules
pub struct NetworkFaultDriver {
    failure_type: FailureType,
    infrastructure: Arc<dyn InfrastructureClient>,
    limits: DriverLimits,
}

impl std::fmt::Debug for NetworkFaultDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkFaultDriver")
            .field("failure_type", &self.failure_type)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl NetworkFaultDriver {
    fn with_type(
        failure_type: FailureType,
        infrastructure: Arc<dyn InfrastructureClient>,
        limits: &DriverLimits,
    ) -> Self {
        Self {
            failure_type,
            infrastructure,
            limits: limits.clone(),
        }
    }

    /// Added delay on every packet (`latency_ms`, `jitter_ms`)
    pub fn latency(infrastructure: Arc<dyn InfrastructureClient>, limits: &DriverLimits) -> Self {
        Self::with_type(FailureType::NetworkLatency, infrastructure, limits)
    }

    /// Dropped traffic to `peers`, or to everything when none are named
    pub fn partition(infrastructure: Arc<dyn InfrastructureClient>, limits: &DriverLimits) -> Self {
        Self::with_type(FailureType::NetworkPartition, infrastructure, limits)
    }

    /// Calls to `dependency` held for `delay_ms`
    pub fn dependency_timeout(
        infrastructure: Arc<dyn InfrastructureClient>,
        limits: &DriverLimits,
    ) -> Self {
        Self::with_type(FailureType::DependencyTimeout, infrastructure, limits)
    }

    fn fault(&self, parameters: &FailureParameters) -> Result<NetworkFault, ApplicationError> {
        match self.failure_type {
            FailureType::NetworkPartition => Ok(NetworkFault::Partition {
                peers: peers(parameters)?,
            }),
            FailureType::DependencyTimeout => {
                let dependency = parameters
                    .get_str(DEPENDENCY_PARAM)
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .ok_or_else(|| {
                        ApplicationError::InvalidOperation(format!(
                            "dependency_timeout needs a '{DEPENDENCY_PARAM}' parameter"
                        ))
                    })?;
                Ok(NetworkFault::DependencyTimeout {
                    dependency: dependency.to_string(),
                    delay_ms: whole(parameters.f64_or(DELAY_PARAM, 0.0)),
                })
            },
            _ => Ok(NetworkFault::Latency {
                delay_ms: whole(parameters.f64_or(LATENCY_PARAM, 0.0)),
                jitter_ms: whole(parameters.f64_or(JITTER_PARAM, 0.0)),
            }),
        }
    }
}

fn peers(parameters: &FailureParameters) -> Result<Vec<String>, ApplicationError> {
    match parameters.get(PEERS_PARAM) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    ApplicationError::InvalidOperation(format!("'{PEERS_PARAM}' must list strings"))
                })
            })
            .collect(),
        Some(_) => Err(ApplicationError::InvalidOperation(format!(
            "'{PEERS_PARAM}' must be a list"
        ))),
    }
}

#[allow(clippy::cast_precision_loss)]
#[async_trait]
impl FailureDriver for NetworkFaultDriver {
    fn failure_type(&self) -> FailureType {
        self.failure_type
    }

    fn clamp_parameters(&self, parameters: &FailureParameters) -> FailureParameters {
        let mut clamped = parameters.clone();
        let limits = &self.limits;
        let changed = match self.failure_type {
            FailureType::NetworkLatency => {
                let max = limits.max_latency_ms as f64;
                let delay = clamped.clamp_f64(LATENCY_PARAM, 1.0, max, limits.default_latency_ms as f64);
                let jitter = clamped.clamp_f64(JITTER_PARAM, 0.0, max, 0.0);
                delay || jitter
            },
            FailureType::DependencyTimeout => clamped.clamp_f64(
                DELAY_PARAM,
                1.0,
                limits.max_dependency_delay_ms as f64,
                limits.default_dependency_delay_ms as f64,
            ),
            _ => false,
        };
        if changed {
            info!(failure_type = %self.failure_type, "Parameters clamped to driver limits");
        }
        clamped
    }

    #[instrument(skip_all, fields(failure_type = %self.failure_type, targets = targets.len()))]
    async fn apply(
        &self,
        targets: &[ResourceId],
        parameters: &FailureParameters,
    ) -> Result<InjectionHandle, ApplicationError> {
        let fault = self.fault(parameters)?;
        let infrastructure = &self.infrastructure;
        let fault = &fault;

        let applied = apply_each(
            targets,
            move |resource| async move { infrastructure.apply_network_fault(&resource, fault).await },
            move |resource, rule_id: String| async move {
                infrastructure.remove_network_fault(&resource, &rule_id).await
            },
        )
        .await?;

        let state = NetworkState {
            rules: applied
                .into_iter()
                .map(|(resource, rule_id)| AppliedRule { resource, rule_id })
                .collect(),
        };
        info!(rules = state.rules.len(), "Network fault applied");

        Ok(InjectionHandle::new(
            self.failure_type,
            targets.to_vec(),
            parameters.clone(),
            encode_state(&state)?,
        ))
    }

    #[instrument(skip_all, fields(failure_type = %self.failure_type, handle_id = %handle.id))]
    async fn remove(&self, handle: &InjectionHandle) -> Result<(), ApplicationError> {
        let state: NetworkState = decode_state(handle)?;
        let mut failures = Vec::new();

        for rule in &state.rules {
            if let Err(e) = self
                .infrastructure
                .remove_network_fault(&rule.resource, &rule.rule_id)
                .await
            {
                warn!(resource = %rule.resource, rule_id = %rule.rule_id, error = %e, "Rule removal failed");
                failures.push(format!("{} ({}): {e}", rule.resource, rule.rule_id));
            }
        }

        removal_result(state.rules.len(), failures)
    }
}
