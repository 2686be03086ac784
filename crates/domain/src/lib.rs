//! Domain layer for the chaos orchestrator
//!
//! Contains experiments, executions, the phase state machine and the failure
//! taxonomy. This layer performs no I/O and defines the ubiquitous language.

pub mod entities;
pub mod errors;
pub mod value_objects;

pub use entities::*;
pub use errors::{ChaosError, DomainError};
pub use value_objects::*;
