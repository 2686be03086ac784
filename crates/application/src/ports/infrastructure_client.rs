//! Infrastructure client port
//!
//! The orchestrator never talks to a cloud provider or cluster directly.
//! Everything it needs from the target environment goes through this port.

use std::collections::BTreeMap;

use async_trait::async_trait;
use domain::ResourceId;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::error::ApplicationError;

/// Health of a single resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceHealth {
    pub resource: ResourceId,
    pub healthy: bool,
    /// Provider-reported detail, e.g. "terminated" or "5/5 checks passing"
    #[serde(default)]
    pub detail: Option<String>,
}

impl ResourceHealth {
    pub const fn healthy(resource: ResourceId) -> Self {
        Self {
            resource,
            healthy: true,
            detail: None,
        }
    }

    pub fn unhealthy(resource: ResourceId, detail: impl Into<String>) -> Self {
        Self {
            resource,
            healthy: false,
            detail: Some(detail.into()),
        }
    }
}

/// Aggregated metrics for a set of resources
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricReading {
    #[serde(default)]
    pub error_rate: Option<f64>,
    #[serde(default)]
    pub availability: Option<f64>,
    #[serde(default)]
    pub latency_p99_ms: Option<f64>,
    #[serde(default)]
    pub healthy_replicas: Option<usize>,
    #[serde(default)]
    pub custom: BTreeMap<String, f64>,
}

/// Network fault applied at the infrastructure level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NetworkFault {
    /// Delay every packet
    Latency { delay_ms: u64, jitter_ms: u64 },
    /// Drop traffic to and from the listed peers (all peers when empty)
    Partition { peers: Vec<String> },
    /// Delay calls to a named dependency
    DependencyTimeout { dependency: String, delay_ms: u64 },
}

/// Port for the target infrastructure
#[cfg_attr(test, automock)]
#[async_trait]
pub trait InfrastructureClient: Send + Sync {
    /// Terminate an instance; the platform is expected to replace it
    async fn terminate_resource(&self, resource: &ResourceId) -> Result<(), ApplicationError>;

    /// Apply a network fault and return its provider rule id
    async fn apply_network_fault(
        &self,
        resource: &ResourceId,
        fault: &NetworkFault,
    ) -> Result<String, ApplicationError>;

    /// Remove a previously applied network fault
    async fn remove_network_fault(
        &self,
        resource: &ResourceId,
        rule_id: &str,
    ) -> Result<(), ApplicationError>;

    /// Take a service out of (or back into) rotation
    async fn set_service_availability(
        &self,
        resource: &ResourceId,
        available: bool,
    ) -> Result<(), ApplicationError>;

    /// Current health of each resource, in request order
    async fn describe_health(
        &self,
        resources: &[ResourceId],
    ) -> Result<Vec<ResourceHealth>, ApplicationError>;

    /// Aggregated metrics over the resources
    async fn list_metrics(&self, resources: &[ResourceId]) -> Result<MetricReading, ApplicationError>;

    /// Size of the pool the targets are drawn from
    async fn count_eligible_resources(
        &self,
        resources: &[ResourceId],
    ) -> Result<usize, ApplicationError>;
}
