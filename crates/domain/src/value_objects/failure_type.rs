//! Failure type value object
//!
//! Enumerates the kinds of failure the orchestrator knows how to inject.
//! Each kind is backed by exactly one failure driver.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of failure an experiment injects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureType {
    /// Terminate compute instances and rely on replacement
    InstanceTermination,
    /// Add latency to network traffic
    NetworkLatency,
    /// Drop traffic between targets and their peers
    NetworkPartition,
    /// Saturate CPU on targets
    CpuStress,
    /// Consume memory on targets
    MemoryStress,
    /// Fill disk on targets
    DiskStress,
    /// Take a service out of rotation
    ServiceUnavailable,
    /// Make calls to a dependency hang
    DependencyTimeout,
}

impl FailureType {
    /// All supported failure types
    pub const ALL: [Self; 8] = [
        Self::InstanceTermination,
        Self::NetworkLatency,
        Self::NetworkPartition,
        Self::CpuStress,
        Self::MemoryStress,
        Self::DiskStress,
        Self::ServiceUnavailable,
        Self::DependencyTimeout,
    ];

    /// Stable snake_case name used in persistence and notifications
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InstanceTermination => "instance_termination",
            Self::NetworkLatency => "network_latency",
            Self::NetworkPartition => "network_partition",
            Self::CpuStress => "cpu_stress",
            Self::MemoryStress => "memory_stress",
            Self::DiskStress => "disk_stress",
            Self::ServiceUnavailable => "service_unavailable",
            Self::DependencyTimeout => "dependency_timeout",
        }
    }

    /// Whether removing the failure cannot restore the original resource
    ///
    /// Terminated instances are gone; recovery depends on the platform
    /// replacing them.
    #[must_use]
    pub const fn is_destructive(&self) -> bool {
        matches!(self, Self::InstanceTermination)
    }

    /// Whether the failure is injected through the remote agent transport
    #[must_use]
    pub const fn requires_agent(&self) -> bool {
        matches!(self, Self::CpuStress | Self::MemoryStress | Self::DiskStress)
    }
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FailureType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| format!("Unknown failure type: {s}"))
    }
}
