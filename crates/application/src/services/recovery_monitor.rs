//! Recovery Monitor - Waits for targets to heal after a failure is removed

use std::sync::Arc;
use std::time::Duration;

use domain::ResourceId;
use serde::{Deserialize, Serialize};
use tokio::time::{Instant, sleep_until, timeout};
use tracing::{debug, info, warn};

use crate::ports::InfrastructureClient;

/// Result of a recovery wait
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecoveryOutcome {
    pub recovered: bool,
    /// Time until the first healthy poll, or the full timeout
    #[serde(with = "duration_secs")]
    pub recovery_duration: Duration,
    pub polls: u32,
}

/// Polls target health until every target is healthy or time runs out
pub struct RecoveryMonitor {
    infrastructure: Arc<dyn InfrastructureClient>,
    poll_interval: Duration,
    recovery_timeout: Duration,
    call_timeout: Duration,
}

impl std::fmt::Debug for RecoveryMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryMonitor")
            .field("poll_interval", &self.poll_interval)
            .field("recovery_timeout", &self.recovery_timeout)
            .finish_non_exhaustive()
    }
}

impl RecoveryMonitor {
    pub fn new(
        infrastructure: Arc<dyn InfrastructureClient>,
        poll_interval: Duration,
        recovery_timeout: Duration,
        call_timeout: Duration,
    ) -> Self {
        Self {
            infrastructure,
            poll_interval: poll_interval.max(Duration::from_millis(10)),
            recovery_timeout,
            call_timeout,
        }
    }

    /// Poll now and every interval until healthy or the timeout elapses
    ///
    /// The bound is measured on the monotonic clock. The last poll happens
    /// exactly at the timeout.
    pub async fn wait_for_recovery(&self, targets: &[ResourceId]) -> RecoveryOutcome {
        let start = Instant::now();
        let deadline = start + self.recovery_timeout;
        let mut polls = 0;

        loop {
            polls += 1;
            if self.all_healthy(targets).await {
                let recovery_duration = start.elapsed().min(self.recovery_timeout);
                info!(polls, secs = recovery_duration.as_secs_f64(), "Targets recovered");
                return RecoveryOutcome {
                    recovered: true,
                    recovery_duration,
                    polls,
                };
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(polls, timeout_secs = self.recovery_timeout.as_secs(), "Targets did not recover");
                return RecoveryOutcome {
                    recovered: false,
                    recovery_duration: self.recovery_timeout,
                    polls,
                };
            }
            sleep_until((now + self.poll_interval).min(deadline)).await;
        }
    }

    async fn all_healthy(&self, targets: &[ResourceId]) -> bool {
        match timeout(self.call_timeout, self.infrastructure.describe_health(targets)).await {
            Ok(Ok(health)) => {
                let healthy = targets
                    .iter()
                    .all(|t| health.iter().any(|h| &h.resource == t && h.healthy));
                debug!(healthy, "Recovery poll");
                healthy
            },
            Ok(Err(e)) => {
                warn!(error = %e, "Recovery health poll failed");
                false
            },
            Err(_) => {
                warn!("Recovery health poll timed out");
                false
            },
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{MockInfrastructureClient, ResourceHealth};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn target() -> Vec<ResourceId> {
        vec![ResourceId::new("i-1").unwrap()]
    }

    fn infra_healthy_after(polls: u32) -> MockInfrastructureClient {
        let seen = Arc::new(AtomicU32::new(0));
        let mut infra = MockInfrastructureClient::new();
        infra.expect_describe_health().returning(move |resources| {
            let n = seen.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(resources
                .iter()
                .cloned()
                .map(|r| {
                    if n >= polls {
                        ResourceHealth::healthy(r)
                    } else {
                        ResourceHealth::unhealthy(r, "replacing")
                    }
                })
                .collect())
        });
        infra
    }

    fn monitor(infra: MockInfrastructureClient) -> RecoveryMonitor {
        RecoveryMonitor::new(
            Arc::new(infra),
            Duration::from_secs(30),
            Duration::from_secs(300),
            Duration::from_secs(5),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn recovered_on_first_healthy_poll() {
        let outcome = monitor(infra_healthy_after(3)).wait_for_recovery(&target()).await;

        assert!(outcome.recovered);
        assert_eq!(outcome.polls, 3);
        assert_eq!(outcome.recovery_duration, Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn immediately_healthy_takes_no_time() {
        let outcome = monitor(infra_healthy_after(1)).wait_for_recovery(&target()).await;
        assert!(outcome.recovered);
        assert_eq!(outcome.recovery_duration, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_exactly_at_timeout() {
        let start = Instant::now();
        let outcome = monitor(infra_healthy_after(u32::MAX)).wait_for_recovery(&target()).await;

        assert!(!outcome.recovered);
        assert_eq!(outcome.recovery_duration, Duration::from_secs(300));
        assert_eq!(start.elapsed(), Duration::from_secs(300));
        // polls at 0, 30, ..., 300
        assert_eq!(outcome.polls, 11);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_targets_count_as_unhealthy() {
        let mut infra = MockInfrastructureClient::new();
        infra.expect_describe_health().returning(|_| Ok(Vec::new()));
        let outcome = RecoveryMonitor::new(
            Arc::new(infra),
            Duration::from_secs(10),
            Duration::from_secs(20),
            Duration::from_secs(1),
        )
        .wait_for_recovery(&target())
        .await;
        assert!(!outcome.recovered);
    }

    #[test]
    fn outcome_serializes_seconds() {
        let outcome = RecoveryOutcome {
            recovered: true,
            recovery_duration: Duration::from_millis(1500),
            polls: 2,
        };
        let value = serde_json::to_value(outcome).unwrap();
        assert_eq!(value["recovery_duration"], serde_json::json!(1.5));
    }
}
