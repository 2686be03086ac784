//! End-to-end experiment runs through the real drivers
//!
//! The orchestrator is wired by the composition root with in-memory stores
//! and `FakePlatform` standing in for the control plane and host agents.
//! Time is paused so whole observation windows run instantly.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use application::ports::{Severity, StressKind};
use domain::{ExecutionStatus, Phase};
use infrastructure::Orchestrator;
use serde_json::{Value, json};

use common::{FakePlatform, RecordingNotifier, config, definition};

async fn orchestrator(platform: &Arc<FakePlatform>, notifier: &Arc<RecordingNotifier>) -> Orchestrator {
    Orchestrator::builder(config())
        .with_infrastructure(platform.clone())
        .with_agent(platform.clone())
        .with_notifier(notifier.clone())
        .build()
        .await
        .expect("orchestrator")
}

#[tokio::test(start_paused = true)]
async fn terminating_one_of_ten_instances_completes() {
    let platform = FakePlatform::new(10);
    let notifier = Arc::new(RecordingNotifier::default());
    let orchestrator = orchestrator(&platform, &notifier).await;
    let service = orchestrator.service();

    let started = tokio::time::Instant::now();
    let experiment_id = service
        .create_experiment(definition("instance_termination", &["i-0a"], json!({})))
        .await
        .unwrap();
    let execution_id = service.execute(experiment_id, "ci").await.unwrap();
    let execution = service.await_execution(execution_id).await.unwrap();

    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(execution.hypothesis_validated, Some(true));
    assert!(started.elapsed() >= Duration::from_secs(600));
    for phase in Phase::ORDER {
        assert!(execution.phase_results.contains_key(&phase), "missing {phase}");
    }
    assert!(!execution.metrics_collected.is_empty());
    assert_eq!(
        execution.phase_results[&Phase::Recovery]["recovery_successful"],
        Value::Bool(true)
    );
    assert_eq!(platform.calls("terminate:"), 1);

    let events = notifier.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].severity, Severity::Info);
    assert_eq!(events[0].execution_id, execution_id);

    // Locks are gone, so the same target can be hit again
    let again = service.execute(experiment_id, "ci").await.unwrap();
    assert_eq!(
        service.await_execution(again).await.unwrap().status,
        ExecutionStatus::Completed
    );
}

#[tokio::test(start_paused = true)]
async fn blast_radius_violation_fails_before_injection() {
    let platform = FakePlatform::new(10);
    let notifier = Arc::new(RecordingNotifier::default());
    let orchestrator = orchestrator(&platform, &notifier).await;
    let service = orchestrator.service();

    let experiment_id = service
        .create_experiment(definition("instance_termination", &["i-0a", "i-0b"], json!({})))
        .await
        .unwrap();
    let execution_id = service.execute(experiment_id, "ci").await.unwrap();
    let execution = service.await_execution(execution_id).await.unwrap();

    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert!(execution.error_message.as_deref().unwrap().contains("blast radius"));
    assert!(execution.injection_handles.is_empty());
    assert_eq!(platform.calls("terminate:"), 0);
}

#[tokio::test(start_paused = true)]
async fn latency_is_clamped_and_rules_are_removed() {
    let platform = FakePlatform::new(10);
    let notifier = Arc::new(RecordingNotifier::default());
    let orchestrator = orchestrator(&platform, &notifier).await;
    let service = orchestrator.service();

    let experiment_id = service
        .create_experiment(definition(
            "network_latency",
            &["web-1"],
            json!({"failure_parameters": {"latency_ms": 60_000}}),
        ))
        .await
        .unwrap();
    let execution_id = service.execute(experiment_id, "ci").await.unwrap();

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(platform.active_rules(), 1);

    let execution = service.await_execution(execution_id).await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(
        execution.phase_results[&Phase::Injection]["parameters"]["latency_ms"],
        json!(5000.0)
    );
    assert_eq!(platform.active_rules(), 0);
    assert_eq!(platform.calls("unfault:"), 1);
}

#[tokio::test(start_paused = true)]
async fn abort_during_observation_rolls_back() {
    let platform = FakePlatform::new(10);
    let notifier = Arc::new(RecordingNotifier::default());
    let orchestrator = orchestrator(&platform, &notifier).await;
    let service = orchestrator.service();

    let experiment_id = service
        .create_experiment(definition("network_partition", &["db-1"], json!({})))
        .await
        .unwrap();
    let execution_id = service.execute(experiment_id, "ci").await.unwrap();

    tokio::time::sleep(Duration::from_secs(120)).await;
    let ack = service.abort(execution_id, "operator stop").await.unwrap();
    assert!(ack.accepted);

    let execution = service.await_execution(execution_id).await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Aborted);
    assert_eq!(execution.error_message.as_deref(), Some("operator stop"));
    assert_eq!(platform.active_rules(), 0);
    assert_eq!(notifier.events()[0].severity, Severity::Warning);

    let repeat = service.abort(execution_id, "again").await.unwrap();
    assert!(!repeat.accepted);
    assert_eq!(repeat.status, ExecutionStatus::Aborted);
}

#[tokio::test(start_paused = true)]
async fn guardrail_breach_aborts_and_removes_the_fault() {
    let platform = FakePlatform::new(10);
    platform.set_error_rate(50.0);
    let notifier = Arc::new(RecordingNotifier::default());
    let orchestrator = orchestrator(&platform, &notifier).await;
    let service = orchestrator.service();

    let experiment_id = service
        .create_experiment(definition(
            "network_latency",
            &["web-1"],
            json!({"safety_checks": {
                "max_blast_radius": 0.1,
                "guardrails": [{"type": "max_error_rate", "max_percentage": 5.0}]
            }}),
        ))
        .await
        .unwrap();
    let execution_id = service.execute(experiment_id, "ci").await.unwrap();
    let execution = service.await_execution(execution_id).await.unwrap();

    assert_eq!(execution.status, ExecutionStatus::Aborted);
    assert!(execution.error_message.as_deref().unwrap().contains("max_error_rate"));
    assert_eq!(
        execution.phase_results[&Phase::Observation]["guardrail_breaches"][0]["guardrail"],
        "max_error_rate"
    );
    assert_eq!(platform.active_rules(), 0);
}

#[tokio::test(start_paused = true)]
async fn failed_removal_needs_manual_intervention() {
    let platform = FakePlatform::new(10);
    platform.fail_removals();
    let notifier = Arc::new(RecordingNotifier::default());
    let orchestrator = orchestrator(&platform, &notifier).await;
    let service = orchestrator.service();

    let experiment_id = service
        .create_experiment(definition("network_partition", &["db-1"], json!({})))
        .await
        .unwrap();
    let execution_id = service.execute(experiment_id, "ci").await.unwrap();
    let execution = service.await_execution(execution_id).await.unwrap();

    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert!(execution.error_message.as_deref().unwrap().contains("manual intervention"));
    assert_eq!(execution.unresolved_handles().len(), 1);
    assert_eq!(platform.active_rules(), 1);

    let events = notifier.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].severity, Severity::Critical);
}

#[tokio::test(start_paused = true)]
async fn transient_apply_errors_are_retried() {
    let platform = FakePlatform::new(10);
    platform.fail_next_applies(2);
    let notifier = Arc::new(RecordingNotifier::default());
    let orchestrator = orchestrator(&platform, &notifier).await;
    let service = orchestrator.service();

    let experiment_id = service
        .create_experiment(definition("service_unavailable", &["checkout"], json!({})))
        .await
        .unwrap();
    let execution_id = service.execute(experiment_id, "ci").await.unwrap();
    let execution = service.await_execution(execution_id).await.unwrap();

    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(platform.calls("drain:"), 3);
    assert_eq!(platform.calls("restore:"), 1);
    assert_eq!(platform.drained(), 0);
}

#[tokio::test(start_paused = true)]
async fn second_experiment_on_a_locked_target_fails() {
    let platform = FakePlatform::new(10);
    let notifier = Arc::new(RecordingNotifier::default());
    let orchestrator = orchestrator(&platform, &notifier).await;
    let service = orchestrator.service();

    let first = service
        .create_experiment(definition("network_latency", &["svc-a"], json!({})))
        .await
        .unwrap();
    let second = service
        .create_experiment(definition("service_unavailable", &["svc-a"], json!({})))
        .await
        .unwrap();

    let running = service.execute(first, "ci").await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    let blocked = service.execute(second, "ci").await.unwrap();

    let blocked = service.await_execution(blocked).await.unwrap();
    assert_eq!(blocked.status, ExecutionStatus::Failed);
    assert!(blocked.error_message.as_deref().unwrap().contains("svc-a is locked"));
    assert_eq!(platform.calls("drain:"), 0);

    let running = service.await_execution(running).await.unwrap();
    assert_eq!(running.status, ExecutionStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn stress_command_runs_for_the_experiment_window() {
    let platform = FakePlatform::new(10);
    let notifier = Arc::new(RecordingNotifier::default());
    let orchestrator = orchestrator(&platform, &notifier).await;
    let service = orchestrator.service();

    let experiment_id = service
        .create_experiment(definition(
            "cpu_stress",
            &["host-1"],
            json!({"failure_parameters": {"cpu_percent": 95}}),
        ))
        .await
        .unwrap();
    let execution_id = service.execute(experiment_id, "ci").await.unwrap();

    tokio::time::sleep(Duration::from_secs(120)).await;
    let commands = platform.running_commands();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].kind, StressKind::Cpu);
    assert_eq!(commands[0].intensity_percent, 90);
    assert_eq!(commands[0].duration_secs, 600);

    let execution = service.await_execution(execution_id).await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert!(platform.running_commands().is_empty());
}

#[tokio::test(start_paused = true)]
async fn slow_recovery_still_reaches_validation() {
    let platform = FakePlatform::new(10);
    platform.set_replacement_polls(10_000);
    let notifier = Arc::new(RecordingNotifier::default());
    let orchestrator = orchestrator(&platform, &notifier).await;
    let service = orchestrator.service();

    let experiment_id = service
        .create_experiment(definition("instance_termination", &["i-0a"], json!({})))
        .await
        .unwrap();
    let execution_id = service.execute(experiment_id, "ci").await.unwrap();
    let execution = service.await_execution(execution_id).await.unwrap();

    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(execution.hypothesis_validated, Some(false));
    assert_eq!(
        execution.phase_results[&Phase::Recovery]["recovery_successful"],
        Value::Bool(false)
    );
    assert!(execution.phase_results.contains_key(&Phase::Validation));
}

#[tokio::test(start_paused = true)]
async fn shutdown_aborts_running_executions() {
    let platform = FakePlatform::new(10);
    let notifier = Arc::new(RecordingNotifier::default());
    let orchestrator = orchestrator(&platform, &notifier).await;
    let service = orchestrator.service();

    let experiment_id = service
        .create_experiment(definition("memory_stress", &["host-2"], json!({})))
        .await
        .unwrap();
    let execution_id = service.execute(experiment_id, "ci").await.unwrap();
    tokio::time::sleep(Duration::from_secs(120)).await;

    orchestrator.shutdown("maintenance").await;

    let execution = service.get_execution(execution_id).await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Aborted);
    assert!(platform.running_commands().is_empty());
}
