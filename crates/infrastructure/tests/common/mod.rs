//! Shared fakes for integration tests
//!
//! `FakePlatform` plays both the control plane and the host agent gateway
//! so the real drivers run end to end without a network.

#![allow(dead_code, clippy::expect_used)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use application::ApplicationError;
use application::ports::{
    InfrastructureClient, MetricReading, NetworkFault, NotificationEvent, NotifierPort,
    RemoteCommandPort, ResourceHealth, StressCommand,
};
use async_trait::async_trait;
use domain::{ExperimentDefinition, ResourceId};
use infrastructure::config::{AppConfig, OrchestratorConfig};
use parking_lot::Mutex;
use serde_json::{Value, json};

#[derive(Debug, Default)]
struct PlatformState {
    pool_size: usize,
    /// Terminated resources and the health polls left until their replacement
    replacing: HashMap<ResourceId, u32>,
    replacement_polls: u32,
    rules: HashMap<String, (ResourceId, NetworkFault)>,
    drained: HashSet<ResourceId>,
    commands: HashMap<String, (ResourceId, StressCommand)>,
    next_id: u64,
    error_rate: f64,
    /// Transient failures returned by the next apply-style calls
    transient_apply_failures: u32,
    fail_removals: bool,
    calls: Vec<String>,
}

/// In-process stand-in for the control plane and host agents
#[derive(Debug, Default)]
pub struct FakePlatform {
    state: Mutex<PlatformState>,
}

impl FakePlatform {
    pub fn new(pool_size: usize) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(PlatformState {
                pool_size,
                replacement_polls: 2,
                error_rate: 0.5,
                ..PlatformState::default()
            }),
        })
    }

    pub fn set_error_rate(&self, percent: f64) {
        self.state.lock().error_rate = percent;
    }

    /// Health polls a terminated instance stays down
    pub fn set_replacement_polls(&self, polls: u32) {
        self.state.lock().replacement_polls = polls;
    }

    pub fn fail_next_applies(&self, count: u32) {
        self.state.lock().transient_apply_failures = count;
    }

    pub fn fail_removals(&self) {
        self.state.lock().fail_removals = true;
    }

    pub fn active_rules(&self) -> usize {
        self.state.lock().rules.len()
    }

    pub fn running_commands(&self) -> Vec<StressCommand> {
        self.state.lock().commands.values().map(|(_, c)| c.clone()).collect()
    }

    pub fn drained(&self) -> usize {
        self.state.lock().drained.len()
    }

    pub fn calls(&self, prefix: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    /// Seed a rule as if a previous process had applied it
    pub fn seed_rule(&self, resource: &str, rule_id: &str) {
        self.state.lock().rules.insert(
            rule_id.to_string(),
            (
                ResourceId::new(resource).expect("resource"),
                NetworkFault::Partition { peers: Vec::new() },
            ),
        );
    }

    fn apply_call(&self, call: String) -> Result<String, ApplicationError> {
        let mut state = self.state.lock();
        state.calls.push(call);
        if state.transient_apply_failures > 0 {
            state.transient_apply_failures -= 1;
            return Err(ApplicationError::ExternalService("HTTP 503".into()));
        }
        state.next_id += 1;
        Ok(format!("id-{}", state.next_id))
    }

    fn remove_call(&self, call: String) -> Result<(), ApplicationError> {
        let mut state = self.state.lock();
        state.calls.push(call);
        if state.fail_removals {
            return Err(ApplicationError::ExternalService("control plane unreachable".into()));
        }
        Ok(())
    }

    fn is_healthy(state: &PlatformState, resource: &ResourceId) -> bool {
        !state.replacing.contains_key(resource) && !state.drained.contains(resource)
    }
}

#[async_trait]
impl InfrastructureClient for FakePlatform {
    async fn terminate_resource(&self, resource: &ResourceId) -> Result<(), ApplicationError> {
        self.apply_call(format!("terminate:{resource}"))?;
        let mut state = self.state.lock();
        let polls = state.replacement_polls;
        state.replacing.insert(resource.clone(), polls);
        Ok(())
    }

    async fn apply_network_fault(
        &self,
        resource: &ResourceId,
        fault: &NetworkFault,
    ) -> Result<String, ApplicationError> {
        let rule_id = self.apply_call(format!("fault:{resource}"))?;
        self.state
            .lock()
            .rules
            .insert(rule_id.clone(), (resource.clone(), fault.clone()));
        Ok(rule_id)
    }

    async fn remove_network_fault(
        &self,
        resource: &ResourceId,
        rule_id: &str,
    ) -> Result<(), ApplicationError> {
        self.remove_call(format!("unfault:{resource}"))?;
        self.state.lock().rules.remove(rule_id);
        Ok(())
    }

    async fn set_service_availability(
        &self,
        resource: &ResourceId,
        available: bool,
    ) -> Result<(), ApplicationError> {
        if available {
            self.remove_call(format!("restore:{resource}"))?;
            self.state.lock().drained.remove(resource);
        } else {
            self.apply_call(format!("drain:{resource}"))?;
            self.state.lock().drained.insert(resource.clone());
        }
        Ok(())
    }

    async fn describe_health(
        &self,
        resources: &[ResourceId],
    ) -> Result<Vec<ResourceHealth>, ApplicationError> {
        let mut state = self.state.lock();
        let health = resources
            .iter()
            .map(|r| {
                if Self::is_healthy(&state, r) {
                    ResourceHealth::healthy(r.clone())
                } else {
                    ResourceHealth::unhealthy(r.clone(), "replacing")
                }
            })
            .collect();

        // Each poll brings replacements one step closer
        state.replacing.retain(|_, left| {
            *left = left.saturating_sub(1);
            *left > 0
        });
        Ok(health)
    }

    async fn list_metrics(&self, resources: &[ResourceId]) -> Result<MetricReading, ApplicationError> {
        let state = self.state.lock();
        let unhealthy = resources.iter().filter(|r| !Self::is_healthy(&state, r)).count();
        Ok(MetricReading {
            error_rate: Some(state.error_rate),
            availability: Some(100.0 - state.error_rate),
            latency_p99_ms: Some(120.0),
            healthy_replicas: Some(state.pool_size.saturating_sub(unhealthy)),
            custom: BTreeMap::new(),
        })
    }

    async fn count_eligible_resources(
        &self,
        _resources: &[ResourceId],
    ) -> Result<usize, ApplicationError> {
        Ok(self.state.lock().pool_size)
    }
}

#[async_trait]
impl RemoteCommandPort for FakePlatform {
    async fn run_command(
        &self,
        resource: &ResourceId,
        command: &StressCommand,
    ) -> Result<String, ApplicationError> {
        let command_id = self.apply_call(format!("run:{resource}"))?;
        self.state
            .lock()
            .commands
            .insert(command_id.clone(), (resource.clone(), command.clone()));
        Ok(command_id)
    }

    async fn stop_command(&self, resource: &ResourceId, command_id: &str) -> Result<(), ApplicationError> {
        self.remove_call(format!("stop:{resource}"))?;
        self.state.lock().commands.remove(command_id);
        Ok(())
    }
}

/// Notifier that keeps every event
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<NotificationEvent>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl NotifierPort for RecordingNotifier {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), ApplicationError> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

/// In-memory configuration with production-like timing
pub fn config() -> AppConfig {
    let mut config = AppConfig::default();
    config.database.path = ":memory:".to_string();
    config.orchestrator = OrchestratorConfig {
        poll_interval_secs: 30,
        recovery_timeout_secs: 300,
        baseline_window_secs: 60,
        ..OrchestratorConfig::default()
    };
    config
}

/// Experiment definition with sensible defaults, overridden by `extra`
pub fn definition(failure_type: &str, targets: &[&str], extra: Value) -> ExperimentDefinition {
    let mut body = json!({
        "name": format!("{failure_type} drill"),
        "failure_type": failure_type,
        "target_resources": targets,
        "duration_secs": 600,
        "hypothesis": "the service keeps serving",
        "success_criteria": [{"type": "recovery_time", "params": {"max_seconds": 300}}],
    });
    if let (Some(body), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
        for (key, value) in extra {
            body.insert(key.clone(), value.clone());
        }
    }
    serde_json::from_value(body).expect("valid definition")
}
