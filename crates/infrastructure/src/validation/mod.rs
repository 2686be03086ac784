//! Configuration validation module
//!
//! Startup checks for settings that make experiments unsafe or unrecoverable.

pub mod settings;

pub use settings::{ConfigValidator, ConfigWarning, WarningSeverity};
