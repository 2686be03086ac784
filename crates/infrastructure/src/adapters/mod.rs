//! Adapters implementing the application ports
//!
//! HTTP adapters for the control plane, the host agent gateway and the
//! webhook notifier, plus in-memory stores and the retrying driver decorator.

mod http_agent_transport;
mod http_control_plane;
mod in_memory_store;
mod log_notifier;
mod retrying_driver;
mod webhook_notifier;

pub use http_agent_transport::HttpAgentTransport;
pub use http_control_plane::HttpControlPlane;
pub use in_memory_store::{InMemoryExecutionLedger, InMemoryExperimentRegistry};
pub use log_notifier::LogNotifier;
pub use retrying_driver::RetryingDriver;
pub use webhook_notifier::WebhookNotifier;
