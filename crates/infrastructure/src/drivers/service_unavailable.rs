//! Service unavailable driver - Takes services out of rotation

use std::sync::Arc;

use application::ports::{FailureDriver, InfrastructureClient};
use application::ApplicationError;
use async_trait::async_trait;
use domain::{FailureParameters, FailureType, InjectionHandle, ResourceId};
use serde_json::json;
use tracing::{info, instrument, warn};

use super::{apply_each, removal_result};

pub struct ServiceUnavailableDriver {
    infrastructure: Arc<dyn InfrastructureClient>,
}

impl std::fmt::Debug for ServiceUnavailableDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceUnavailableDriver").finish_non_exhaustive()
    }
}

impl ServiceUnavailableDriver {
    pub fn new(infrastructure: Arc<dyn InfrastructureClient>) -> Self {
        Self { infrastructure }
    }
}

#[async_trait]
impl FailureDriver for ServiceUnavailableDriver {
    fn failure_type(&self) -> FailureType {
        FailureType::ServiceUnavailable
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
        let infrastructure = &self.infrastructure;
        apply_each(
            targets,
            move |resource| async move { infrastructure.set_service_availability(&resource, false).await },
            move |resource, ()| async move { infrastructure.set_service_availability(&resource, true).await },
        )
        .await?;

        info!(count = targets.len(), "Services taken out of rotation");
        Ok(InjectionHandle::new(
            FailureType::ServiceUnavailable,
            targets.to_vec(),
            parameters.clone(),
            json!({ "drained": targets }),
        ))
    }

    #[instrument(skip_all, fields(handle_id = %handle.id))]
    async fn remove(&self, handle: &InjectionHandle) -> Result<(), ApplicationError> {
        let mut failures = Vec::new();
        for resource in &handle.targets {
            if let Err(e) = self.infrastructure.set_service_availability(resource, true).await {
                warn!(resource = %resource, error = %e, "Could not restore service");
                failures.push(format!("{resource}: {e}"));
            }
        }
        removal_result(handle.targets.len(), failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockInfrastructure, resources};

    #[tokio::test]
    async fn drains_and_restores() {
        let mut infra = MockInfrastructure::new();
        infra
            .expect_set_service_availability()
            .withf(|_, available| !*available)
            .times(2)
            .returning(|_, _| Ok(()));
        infra
            .expect_set_service_availability()
            .withf(|_, available| *available)
            .times(2)
            .returning(|_, _| Ok(()));

        let driver = ServiceUnavailableDriver::new(Arc::new(infra));
        let handle = driver
            .apply(&resources(&["api", "worker"]), &FailureParameters::new())
            .await
            .unwrap();
        assert_eq!(handle.driver_state["drained"][0], "api");
        driver.remove(&handle).await.unwrap();
    }

    #[tokio::test]
    async fn restores_drained_services_when_a_later_one_fails() {
        let mut infra = MockInfrastructure::new();
        infra
            .expect_set_service_availability()
            .withf(|r, available| r.as_str() == "api" && !*available)
            .returning(|_, _| Ok(()));
        infra
            .expect_set_service_availability()
            .withf(|r, available| r.as_str() == "worker" && !*available)
            .returning(|_, _| Err(ApplicationError::NotFound("worker".into())));
        infra
            .expect_set_service_availability()
            .withf(|r, available| r.as_str() == "api" && *available)
            .times(1)
            .returning(|_, _| Ok(()));

        let driver = ServiceUnavailableDriver::new(Arc::new(infra));
        let err = driver
            .apply(&resources(&["api", "worker"]), &FailureParameters::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::NotFound(_)));
    }
}
