//! Application layer - Use cases and orchestration
//!
//! Contains the phase executor and the services it coordinates, plus the
//! port definitions infrastructure adapters implement.

pub mod error;
pub mod ports;
pub mod services;

#[cfg(test)]
pub(crate) mod testing;

pub use error::ApplicationError;
pub use ports::*;
pub use services::*;
