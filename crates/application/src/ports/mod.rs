//! Port definitions for application layer
//!
//! Ports are interfaces that define how the application interacts with
//! external systems. Adapters in the infrastructure layer implement these ports.

mod execution_ledger;
mod experiment_registry;
mod failure_driver;
mod infrastructure_client;
mod notifier;
mod remote_command;

#[cfg(test)]
pub use execution_ledger::MockExecutionLedgerPort;
pub use execution_ledger::{ExecutionFilter, ExecutionLedgerPort};
#[cfg(test)]
pub use experiment_registry::MockExperimentRegistryPort;
pub use experiment_registry::ExperimentRegistryPort;
#[cfg(test)]
pub use failure_driver::MockFailureDriver;
pub use failure_driver::{DriverRegistry, FailureDriver};
#[cfg(test)]
pub use infrastructure_client::MockInfrastructureClient;
pub use infrastructure_client::{InfrastructureClient, MetricReading, NetworkFault, ResourceHealth};
#[cfg(test)]
pub use notifier::MockNotifierPort;
pub use notifier::{NotificationEvent, NotifierPort, Severity};
#[cfg(test)]
pub use remote_command::MockRemoteCommandPort;
pub use remote_command::{RemoteCommandPort, StressCommand, StressKind};
