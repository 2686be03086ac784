//! Mock ports for driver and adapter unit tests
//!
//! The application crate only generates its mocks under its own
//! `cfg(test)`, so the ports used here are mocked again with `mock!`.

use application::ApplicationError;
use application::ports::{
    FailureDriver, InfrastructureClient, MetricReading, NetworkFault, RemoteCommandPort,
    ResourceHealth, StressCommand,
};
use async_trait::async_trait;
use domain::{FailureParameters, FailureType, InjectionHandle, ResourceId};
use mockall::mock;

mock! {
    pub Driver {}

    #[async_trait]
    impl FailureDriver for Driver {
        fn failure_type(&self) -> FailureType;
        fn clamp_parameters(&self, parameters: &FailureParameters) -> FailureParameters;
        async fn apply(
            &self,
            targets: &[ResourceId],
            parameters: &FailureParameters,
        ) -> Result<InjectionHandle, ApplicationError>;
        async fn remove(&self, handle: &InjectionHandle) -> Result<(), ApplicationError>;
    }
}

mock! {
    pub Infrastructure {}

    #[async_trait]
    impl InfrastructureClient for Infrastructure {
        async fn terminate_resource(&self, resource: &ResourceId) -> Result<(), ApplicationError>;
        async fn apply_network_fault(
            &self,
            resource: &ResourceId,
            fault: &NetworkFault,
        ) -> Result<String, ApplicationError>;
        async fn remove_network_fault(
            &self,
            resource: &ResourceId,
            rule_id: &str,
        ) -> Result<(), ApplicationError>;
        async fn set_service_availability(
            &self,
            resource: &ResourceId,
            available: bool,
        ) -> Result<(), ApplicationError>;
        async fn describe_health(
            &self,
            resources: &[ResourceId],
        ) -> Result<Vec<ResourceHealth>, ApplicationError>;
        async fn list_metrics(&self, resources: &[ResourceId]) -> Result<MetricReading, ApplicationError>;
        async fn count_eligible_resources(
            &self,
            resources: &[ResourceId],
        ) -> Result<usize, ApplicationError>;
    }
}

mock! {
    pub Agent {}

    #[async_trait]
    impl RemoteCommandPort for Agent {
        async fn run_command(
            &self,
            resource: &ResourceId,
            command: &StressCommand,
        ) -> Result<String, ApplicationError>;
        async fn stop_command(&self, resource: &ResourceId, command_id: &str) -> Result<(), ApplicationError>;
    }
}

pub fn resources(ids: &[&str]) -> Vec<ResourceId> {
    ids.iter().map(|id| ResourceId::new(*id).unwrap()).collect()
}
