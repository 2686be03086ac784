//! In-memory fakes for service tests

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use domain::{
    Execution, ExecutionId, Experiment, ExperimentDefinition, ExperimentId, FailureParameters,
    FailureType, InjectionHandle, LedgerEvent, LedgerEventKind, ResourceId,
};
use parking_lot::Mutex;
use serde_json::{Value, json};

use crate::error::ApplicationError;
use crate::ports::{
    ExecutionFilter, ExecutionLedgerPort, ExperimentRegistryPort, FailureDriver,
    InfrastructureClient, MetricReading, NetworkFault, NotificationEvent, NotifierPort,
    ResourceHealth,
};

pub fn experiment(failure_type: FailureType, targets: &[&str], extra: Value) -> Experiment {
    let mut body = json!({
        "name": "test experiment",
        "failure_type": failure_type,
        "target_resources": targets,
        "duration_secs": 120,
        "hypothesis": "the service survives",
        "success_criteria": [{"type": "recovery_time", "params": {"max_seconds": 300}}],
        "safety_checks": {"max_blast_radius": 0.5}
    });
    if let (Some(body), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
        for (k, v) in extra {
            body.insert(k.clone(), v.clone());
        }
    }
    let definition: ExperimentDefinition = serde_json::from_value(body).unwrap();
    Experiment::from_definition(definition).unwrap()
}

#[derive(Default)]
struct LedgerState {
    executions: HashMap<ExecutionId, Execution>,
    events: Vec<LedgerEvent>,
    locks: HashMap<ResourceId, ExecutionId>,
}

#[derive(Default)]
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
    /// Yield once inside `insert`, as a real store would
    pub slow_inserts: AtomicBool,
    /// Refuse `Finished` events
    pub fail_terminal_writes: AtomicBool,
}

impl MemoryLedger {
    pub fn locks_held(&self) -> usize {
        self.state.lock().locks.len()
    }

    pub fn event_count(&self, id: ExecutionId) -> usize {
        self.state.lock().events.iter().filter(|e| e.execution_id == id).count()
    }

    pub fn lock(&self, resource: &str, holder: ExecutionId) {
        self.state
            .lock()
            .locks
            .insert(ResourceId::new(resource).unwrap(), holder);
    }
}

#[async_trait]
impl ExecutionLedgerPort for MemoryLedger {
    async fn insert(&self, execution: &Execution) -> Result<(), ApplicationError> {
        if self.slow_inserts.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
        self.state
            .lock()
            .executions
            .insert(execution.id, execution.clone());
        Ok(())
    }

    async fn record(&self, execution: &Execution, event: &LedgerEvent) -> Result<(), ApplicationError> {
        if self.fail_terminal_writes.load(Ordering::SeqCst)
            && matches!(event.kind, LedgerEventKind::Finished { .. })
        {
            return Err(ApplicationError::Internal("disk full".into()));
        }
        let mut state = self.state.lock();
        if state
            .executions
            .get(&execution.id)
            .is_some_and(Execution::is_terminal)
        {
            return Err(ApplicationError::Conflict("execution already terminal".into()));
        }
        state.executions.insert(execution.id, execution.clone());
        state.events.push(event.clone());
        Ok(())
    }

    async fn get(&self, id: ExecutionId) -> Result<Option<Execution>, ApplicationError> {
        Ok(self.state.lock().executions.get(&id).cloned())
    }

    async fn list_by_experiment(&self, experiment_id: ExperimentId) -> Result<Vec<Execution>, ApplicationError> {
        self.list(&ExecutionFilter::for_experiment(experiment_id)).await
    }

    async fn list_active(&self) -> Result<Vec<Execution>, ApplicationError> {
        self.list(&ExecutionFilter::active()).await
    }

    async fn list(&self, filter: &ExecutionFilter) -> Result<Vec<Execution>, ApplicationError> {
        let mut out: Vec<_> = self
            .state
            .lock()
            .executions
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        if let Some(limit) = filter.limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    async fn events(&self, id: ExecutionId) -> Result<Vec<LedgerEvent>, ApplicationError> {
        Ok(self
            .state
            .lock()
            .events
            .iter()
            .filter(|e| e.execution_id == id)
            .cloned()
            .collect())
    }

    async fn acquire_locks(&self, execution_id: ExecutionId, resources: &[ResourceId]) -> Result<(), ApplicationError> {
        let mut state = self.state.lock();
        if let Some(r) = resources
            .iter()
            .find(|r| state.locks.get(*r).is_some_and(|holder| *holder != execution_id))
        {
            return Err(ApplicationError::Conflict(format!("{r} is locked")));
        }
        for r in resources {
            state.locks.insert(r.clone(), execution_id);
        }
        Ok(())
    }

    async fn release_locks(&self, execution_id: ExecutionId) -> Result<(), ApplicationError> {
        self.state.lock().locks.retain(|_, holder| *holder != execution_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryRegistry {
    experiments: Mutex<HashMap<ExperimentId, Experiment>>,
}

#[async_trait]
impl ExperimentRegistryPort for MemoryRegistry {
    async fn create(&self, experiment: &Experiment) -> Result<(), ApplicationError> {
        let mut map = self.experiments.lock();
        if map.contains_key(&experiment.id) {
            return Err(ApplicationError::Conflict("exists".into()));
        }
        map.insert(experiment.id, experiment.clone());
        Ok(())
    }

    async fn get(&self, id: ExperimentId) -> Result<Option<Experiment>, ApplicationError> {
        Ok(self.experiments.lock().get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Experiment>, ApplicationError> {
        Ok(self.experiments.lock().values().cloned().collect())
    }
}

/// Scripted infrastructure: a pool of `total` resources, healthy unless told otherwise
pub struct FakeInfrastructure {
    pub total: usize,
    pub healthy: AtomicBool,
    pub readings: Mutex<VecDeque<MetricReading>>,
    pub health_calls: AtomicU32,
}

impl FakeInfrastructure {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            healthy: AtomicBool::new(true),
            readings: Mutex::new(VecDeque::new()),
            health_calls: AtomicU32::new(0),
        }
    }

    pub fn script_readings(&self, readings: impl IntoIterator<Item = MetricReading>) {
        self.readings.lock().extend(readings);
    }
}

pub fn healthy_reading() -> MetricReading {
    MetricReading {
        error_rate: Some(0.1),
        availability: Some(99.95),
        latency_p99_ms: Some(80.0),
        healthy_replicas: Some(3),
        ..MetricReading::default()
    }
}

#[async_trait]
impl InfrastructureClient for FakeInfrastructure {
    async fn terminate_resource(&self, _resource: &ResourceId) -> Result<(), ApplicationError> {
        Ok(())
    }

    async fn apply_network_fault(&self, _resource: &ResourceId, _fault: &NetworkFault) -> Result<String, ApplicationError> {
        Ok("rule-1".into())
    }

    async fn remove_network_fault(&self, _resource: &ResourceId, _rule_id: &str) -> Result<(), ApplicationError> {
        Ok(())
    }

    async fn set_service_availability(&self, _resource: &ResourceId, _available: bool) -> Result<(), ApplicationError> {
        Ok(())
    }

    async fn describe_health(&self, resources: &[ResourceId]) -> Result<Vec<ResourceHealth>, ApplicationError> {
        self.health_calls.fetch_add(1, Ordering::SeqCst);
        let healthy = self.healthy.load(Ordering::SeqCst);
        Ok(resources
            .iter()
            .cloned()
            .map(|r| {
                if healthy {
                    ResourceHealth::healthy(r)
                } else {
                    ResourceHealth::unhealthy(r, "down")
                }
            })
            .collect())
    }

    async fn list_metrics(&self, _resources: &[ResourceId]) -> Result<MetricReading, ApplicationError> {
        Ok(self.readings.lock().pop_front().unwrap_or_else(healthy_reading))
    }

    async fn count_eligible_resources(&self, _resources: &[ResourceId]) -> Result<usize, ApplicationError> {
        Ok(self.total)
    }
}

/// Driver that counts calls and can be told to fail or stall
pub struct RecordingDriver {
    pub failure_type: FailureType,
    pub applies: AtomicU32,
    pub removes: AtomicU32,
    pub fail_apply: AtomicBool,
    pub fail_remove: AtomicBool,
    pub apply_delay: Duration,
}

impl RecordingDriver {
    pub fn new(failure_type: FailureType) -> Self {
        Self {
            failure_type,
            applies: AtomicU32::new(0),
            removes: AtomicU32::new(0),
            fail_apply: AtomicBool::new(false),
            fail_remove: AtomicBool::new(false),
            apply_delay: Duration::ZERO,
        }
    }

    #[must_use]
    pub const fn with_apply_delay(mut self, delay: Duration) -> Self {
        self.apply_delay = delay;
        self
    }

    pub fn applies(&self) -> u32 {
        self.applies.load(Ordering::SeqCst)
    }

    pub fn removes(&self) -> u32 {
        self.removes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FailureDriver for RecordingDriver {
    fn failure_type(&self) -> FailureType {
        self.failure_type
    }

    fn clamp_parameters(&self, parameters: &FailureParameters) -> FailureParameters {
        parameters.clone()
    }

    async fn apply(&self, targets: &[ResourceId], parameters: &FailureParameters) -> Result<InjectionHandle, ApplicationError> {
        if !self.apply_delay.is_zero() {
            tokio::time::sleep(self.apply_delay).await;
        }
        if self.fail_apply.load(Ordering::SeqCst) {
            return Err(ApplicationError::ExternalService("apply refused".into()));
        }
        self.applies.fetch_add(1, Ordering::SeqCst);
        Ok(InjectionHandle::new(
            self.failure_type,
            targets.to_vec(),
            parameters.clone(),
            Value::Null,
        ))
    }

    async fn remove(&self, _handle: &InjectionHandle) -> Result<(), ApplicationError> {
        if self.fail_remove.load(Ordering::SeqCst) {
            return Err(ApplicationError::ExternalService("remove refused".into()));
        }
        self.removes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub events: Mutex<Vec<NotificationEvent>>,
}

#[async_trait]
impl NotifierPort for RecordingNotifier {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), ApplicationError> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}
