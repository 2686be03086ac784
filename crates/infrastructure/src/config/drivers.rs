//! Safe maxima for failure parameters.
//!
//! Drivers clamp requested parameters into these bounds before applying
//! anything, so a typo in an experiment can never take down a whole host.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Per-kind parameter limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct DriverLimits {
    /// Largest injected network delay (default: 5000ms)
    #[serde(default = "default_max_latency")]
    #[validate(range(min = 1))]
    pub max_latency_ms: u64,

    /// Delay used when an experiment names none (default: 200ms)
    #[serde(default = "default_latency")]
    pub default_latency_ms: u64,

    /// Largest CPU load in percent (default: 90)
    #[serde(default = "default_max_cpu")]
    #[validate(range(min = 1.0, max = 100.0))]
    pub max_cpu_percent: f64,

    /// Largest memory fill in percent (default: 80)
    #[serde(default = "default_max_memory")]
    #[validate(range(min = 1.0, max = 100.0))]
    pub max_memory_percent: f64,

    /// Largest disk fill in percent (default: 85)
    #[serde(default = "default_max_disk")]
    #[validate(range(min = 1.0, max = 100.0))]
    pub max_disk_percent: f64,

    /// Stress intensity used when an experiment names none (default: 50)
    #[serde(default = "default_stress")]
    pub default_stress_percent: f64,

    /// Largest delay injected in front of a dependency (default: 60000ms)
    #[serde(default = "default_max_dependency_delay")]
    #[validate(range(min = 1))]
    pub max_dependency_delay_ms: u64,

    /// Dependency delay used when an experiment names none (default: 30000ms)
    #[serde(default = "default_dependency_delay")]
    pub default_dependency_delay_ms: u64,
}

const fn default_max_latency() -> u64 {
    5_000
}

const fn default_latency() -> u64 {
    200
}

const fn default_max_cpu() -> f64 {
    90.0
}

const fn default_max_memory() -> f64 {
    80.0
}

const fn default_max_disk() -> f64 {
    85.0
}

const fn default_stress() -> f64 {
    50.0
}

const fn default_max_dependency_delay() -> u64 {
    60_000
}

const fn default_dependency_delay() -> u64 {
    30_000
}

impl Default for DriverLimits {
    fn default() -> Self {
        Self {
            max_latency_ms: default_max_latency(),
            default_latency_ms: default_latency(),
            max_cpu_percent: default_max_cpu(),
            max_memory_percent: default_max_memory(),
            max_disk_percent: default_max_disk(),
            default_stress_percent: default_stress(),
            max_dependency_delay_ms: default_max_dependency_delay(),
            default_dependency_delay_ms: default_dependency_delay(),
        }
    }
}
