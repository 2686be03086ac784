//! Control plane adapter - Implements InfrastructureClient over HTTP
//!
//! Endpoints (all JSON, relative to `control_plane_url`):
//!
//! | Operation            | Request                                             |
//! |----------------------|-----------------------------------------------------|
//! | terminate            | `POST /v1/resources/{id}/terminate`                 |
//! | network fault        | `POST /v1/resources/{id}/network-faults` -> rule id |
//! | remove network fault | `DELETE /v1/resources/{id}/network-faults/{rule}`   |
//! | availability         | `PUT /v1/resources/{id}/availability`               |
//! | health               | `POST /v1/health`                                   |
//! | metrics              | `POST /v1/metrics`                                  |
//! | pool size            | `POST /v1/pools/eligible`                           |

use std::collections::HashMap;

use application::ports::{InfrastructureClient, MetricReading, NetworkFault, ResourceHealth};
use application::ApplicationError;
use async_trait::async_trait;
use domain::ResourceId;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::http::{PlatformError, PlatformHttpClient};

#[derive(Serialize)]
struct ResourcesRequest<'a> {
    resources: &'a [ResourceId],
}

#[derive(Serialize)]
struct AvailabilityRequest {
    available: bool,
}

#[derive(Deserialize)]
struct RuleResponse {
    rule_id: String,
}

#[derive(Deserialize)]
struct HealthResponse {
    resources: Vec<ResourceHealth>,
}

#[derive(Deserialize)]
struct PoolResponse {
    count: usize,
}

/// [`InfrastructureClient`] backed by the control plane REST API
#[derive(Debug, Clone)]
pub struct HttpControlPlane {
    client: PlatformHttpClient,
}

impl HttpControlPlane {
    pub const fn new(client: PlatformHttpClient) -> Self {
        Self { client }
    }

    fn resource_path(resource: &ResourceId, suffix: &str) -> String {
        format!("/v1/resources/{}/{suffix}", resource.as_str())
    }
}

#[async_trait]
impl InfrastructureClient for HttpControlPlane {
    #[instrument(skip(self), fields(resource = %resource))]
    async fn terminate_resource(&self, resource: &ResourceId) -> Result<(), ApplicationError> {
        self.client
            .post(&Self::resource_path(resource, "terminate"), &serde_json::json!({}))
            .await?;
        debug!("Termination accepted");
        Ok(())
    }

    #[instrument(skip(self, fault), fields(resource = %resource))]
    async fn apply_network_fault(
        &self,
        resource: &ResourceId,
        fault: &NetworkFault,
    ) -> Result<String, ApplicationError> {
        let response: RuleResponse = self
            .client
            .post_json(&Self::resource_path(resource, "network-faults"), fault)
            .await?;
        debug!(rule_id = %response.rule_id, "Network fault applied");
        Ok(response.rule_id)
    }

    #[instrument(skip(self), fields(resource = %resource))]
    async fn remove_network_fault(
        &self,
        resource: &ResourceId,
        rule_id: &str,
    ) -> Result<(), ApplicationError> {
        let path = Self::resource_path(resource, &format!("network-faults/{rule_id}"));
        match self.client.delete(&path).await {
            Ok(()) => Ok(()),
            Err(PlatformError::NotFound(_)) => {
                debug!(rule_id, "Network fault already gone");
                Ok(())
            },
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self), fields(resource = %resource))]
    async fn set_service_availability(
        &self,
        resource: &ResourceId,
        available: bool,
    ) -> Result<(), ApplicationError> {
        self.client
            .put(
                &Self::resource_path(resource, "availability"),
                &AvailabilityRequest { available },
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self, resources), fields(count = resources.len()))]
    async fn describe_health(
        &self,
        resources: &[ResourceId],
    ) -> Result<Vec<ResourceHealth>, ApplicationError> {
        let response: HealthResponse = self
            .client
            .post_json("/v1/health", &ResourcesRequest { resources })
            .await?;

        let mut reported: HashMap<ResourceId, ResourceHealth> = response
            .resources
            .into_iter()
            .map(|h| (h.resource.clone(), h))
            .collect();

        Ok(resources
            .iter()
            .map(|r| {
                reported.remove(r).unwrap_or_else(|| {
                    warn!(resource = %r, "Control plane did not report health");
                    ResourceHealth::unhealthy(r.clone(), "not reported")
                })
            })
            .collect())
    }

    #[instrument(skip(self, resources), fields(count = resources.len()))]
    async fn list_metrics(&self, resources: &[ResourceId]) -> Result<MetricReading, ApplicationError> {
        Ok(self
            .client
            .post_json("/v1/metrics", &ResourcesRequest { resources })
            .await?)
    }

    #[instrument(skip(self, resources), fields(count = resources.len()))]
    async fn count_eligible_resources(
        &self,
        resources: &[ResourceId],
    ) -> Result<usize, ApplicationError> {
        let response: PoolResponse = self
            .client
            .post_json("/v1/pools/eligible", &ResourcesRequest { resources })
            .await?;
        Ok(response.count)
    }
}
