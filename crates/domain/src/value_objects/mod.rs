//! Value Objects - Immutable, identity-less domain primitives

mod execution_id;
mod execution_status;
mod experiment_id;
mod failure_type;
mod injection_id;
mod resource_id;

pub use execution_id::ExecutionId;
pub use execution_status::{ExecutionStatus, Phase};
pub use experiment_id::ExperimentId;
pub use failure_type::FailureType;
pub use injection_id::InjectionId;
pub use resource_id::ResourceId;
