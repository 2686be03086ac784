//! Phase executor configuration.

use std::time::Duration;

use application::ExecutorSettings;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::default_true;

/// Timing, safety and concurrency settings of the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct OrchestratorConfig {
    /// Metrics and guardrail sampling interval (default: 30s)
    #[serde(default = "default_poll_interval")]
    #[validate(range(min = 1))]
    pub poll_interval_secs: u64,

    /// Upper bound of the recovery wait (default: 300s)
    #[serde(default = "default_recovery_timeout")]
    #[validate(range(min = 1))]
    pub recovery_timeout_secs: u64,

    /// Baseline capture window before injection (default: 60s)
    #[serde(default = "default_baseline_window")]
    pub baseline_window_secs: u64,

    /// Orchestrator-wide blast radius ceiling (default: 0.10)
    #[serde(default = "default_max_blast_radius")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub max_blast_radius: f64,

    /// Deadline of a driver apply or remove, retries included (default: 120s)
    #[serde(default = "default_driver_timeout")]
    #[validate(range(min = 1))]
    pub driver_timeout_secs: u64,

    /// Deadline of a single health or metrics read (default: 10s)
    #[serde(default = "default_call_timeout")]
    #[validate(range(min = 1))]
    pub call_timeout_secs: u64,

    /// Executions allowed to run at once (default: 10)
    #[serde(default = "default_max_concurrent")]
    #[validate(range(min = 1))]
    pub max_concurrent_executions: usize,

    /// Clean up executions left running by a previous process (default: true)
    #[serde(default = "default_true")]
    pub recover_orphans_on_startup: bool,
}

const fn default_poll_interval() -> u64 {
    30
}

const fn default_recovery_timeout() -> u64 {
    300
}

const fn default_baseline_window() -> u64 {
    60
}

const fn default_max_blast_radius() -> f64 {
    domain::DEFAULT_MAX_BLAST_RADIUS
}

const fn default_driver_timeout() -> u64 {
    120
}

const fn default_call_timeout() -> u64 {
    10
}

const fn default_max_concurrent() -> usize {
    10
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            recovery_timeout_secs: default_recovery_timeout(),
            baseline_window_secs: default_baseline_window(),
            max_blast_radius: default_max_blast_radius(),
            driver_timeout_secs: default_driver_timeout(),
            call_timeout_secs: default_call_timeout(),
            max_concurrent_executions: default_max_concurrent(),
            recover_orphans_on_startup: true,
        }
    }
}

impl OrchestratorConfig {
    /// Executor settings for this configuration
    ///
    /// `apply_attempts` and `notify_timeout` come from the retry and
    /// notifier sections.
    pub fn to_executor_settings(&self, apply_attempts: u32, notify_timeout: Duration) -> ExecutorSettings {
        ExecutorSettings {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            recovery_timeout: Duration::from_secs(self.recovery_timeout_secs),
            baseline_window: Duration::from_secs(self.baseline_window_secs),
            max_blast_radius: self.max_blast_radius,
            driver_timeout: Duration::from_secs(self.driver_timeout_secs),
            call_timeout: Duration::from_secs(self.call_timeout_secs),
            notify_timeout,
            max_concurrent_executions: self.max_concurrent_executions,
            apply_attempts,
        }
    }
}
