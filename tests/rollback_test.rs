// Rollback Controller Tests
// ============================================================================
//
// Verifies the automatic rollback loop end to end:
// 1. A breached threshold with enough samples fails the experiment and
//    notifies exactly once
// 2. Insufficient sample size never triggers, no matter how bad the data
// 3. A failed experiment stays failed; repeat scans re-fire nothing
// 4. Custom triggers are validated at construction and evaluated in order
//    after experiment thresholds, short-circuiting on the first hit
//
// ============================================================================

use pqgate::config::Config;
use pqgate::experiments::{Experiment, ExperimentRegistry, ExperimentStatus, Variant};
use pqgate::metrics::MetricsCollector;
use pqgate::notify::{Notifier, Severity};
use pqgate::rollback::{Comparison, RollbackController, RollbackTrigger};
use std::collections::BTreeMap;
use std::sync::Arc;

use test_utils::RecordingChannel;

struct Fixture {
    experiments: Arc<ExperimentRegistry>,
    metrics: Arc<MetricsCollector>,
    controller: RollbackController,
    channel: Arc<RecordingChannel>,
}

async fn fixture(failure_thresholds: BTreeMap<String, f64>) -> Fixture {
    let config = Config::default();
    let experiments = Arc::new(ExperimentRegistry::new());
    experiments
        .register(Experiment {
            experiment_id: "exp1".to_string(),
            name: "PQC rollout".to_string(),
            target_feature_flag: "pqc_encryption".to_string(),
            control_percentage: 95,
            treatment_percentage: 5,
            success_metrics: vec!["error_rate".to_string()],
            failure_thresholds,
            status: ExperimentStatus::Running,
        })
        .await
        .unwrap();

    let metrics = Arc::new(MetricsCollector::new(&config));
    let notifier = Arc::new(Notifier::new());
    let channel = Arc::new(RecordingChannel::new());
    notifier.register(channel.clone()).await;

    let controller = RollbackController::new(
        &config,
        experiments.clone(),
        metrics.clone(),
        notifier,
    );

    Fixture {
        experiments,
        metrics,
        controller,
        channel,
    }
}

fn error_rate_threshold() -> BTreeMap<String, f64> {
    let mut thresholds = BTreeMap::new();
    thresholds.insert("error_rate".to_string(), 0.05);
    thresholds
}

async fn record_treatment_errors(metrics: &MetricsCollector, count: usize, value: f64) {
    for i in 0..count {
        metrics
            .record_event(
                &format!("user-{}", i),
                "exp1",
                Variant::Treatment,
                "error_rate",
                value,
            )
            .await;
    }
}

#[tokio::test]
async fn test_end_to_end_rollback_fires_once() {
    let f = fixture(error_rate_threshold()).await;

    // 100 treatment events averaging 0.10 against a 0.05 threshold
    record_treatment_errors(&f.metrics, 100, 0.10).await;

    let events = f.controller.monitor_experiments().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].experiment_id, "exp1");
    assert_eq!(events[0].metric_name, "error_rate");
    assert_eq!(events[0].sample_count, 100);

    let experiment = f.experiments.get("exp1").await.unwrap();
    assert_eq!(experiment.status, ExperimentStatus::Failed);

    // Exactly one critical notification
    assert_eq!(f.channel.count(), 1);
    {
        let notifications = f.channel.notifications.lock().unwrap();
        assert_eq!(notifications[0].severity, Severity::Critical);
        assert_eq!(notifications[0].experiment_id.as_deref(), Some("exp1"));
    }

    // Second scan: still failed, nothing re-fires
    let events = f.controller.monitor_experiments().await;
    assert!(events.is_empty());
    assert_eq!(f.channel.count(), 1);
    assert_eq!(
        f.experiments.get("exp1").await.unwrap().status,
        ExperimentStatus::Failed
    );
}

#[tokio::test]
async fn test_insufficient_samples_never_trigger() {
    let f = fixture(error_rate_threshold()).await;

    // 10 catastrophic-looking events, but min_sample_size is 100
    record_treatment_errors(&f.metrics, 10, 1.0).await;

    let events = f.controller.monitor_experiments().await;
    assert!(events.is_empty());
    assert_eq!(
        f.experiments.get("exp1").await.unwrap().status,
        ExperimentStatus::Running
    );
    assert_eq!(f.channel.count(), 0);
}

#[tokio::test]
async fn test_rollback_fires_exactly_at_sample_threshold() {
    let f = fixture(error_rate_threshold()).await;

    record_treatment_errors(&f.metrics, 99, 1.0).await;
    assert!(f.controller.monitor_experiments().await.is_empty());

    record_treatment_errors(&f.metrics, 1, 1.0).await;
    let events = f.controller.monitor_experiments().await;
    assert_eq!(events.len(), 1);
}

#[tokio::test]
async fn test_control_arm_data_never_rolls_back() {
    let f = fixture(error_rate_threshold()).await;

    // Control arm on fire, treatment arm empty
    for i in 0..200 {
        f.metrics
            .record_event(
                &format!("user-{}", i),
                "exp1",
                Variant::Control,
                "error_rate",
                1.0,
            )
            .await;
    }

    assert!(f.controller.monitor_experiments().await.is_empty());
    assert_eq!(
        f.experiments.get("exp1").await.unwrap().status,
        ExperimentStatus::Running
    );
}

#[tokio::test]
async fn test_healthy_metrics_do_not_roll_back() {
    let f = fixture(error_rate_threshold()).await;

    record_treatment_errors(&f.metrics, 500, 0.01).await;

    assert!(f.controller.monitor_experiments().await.is_empty());
    assert_eq!(
        f.experiments.get("exp1").await.unwrap().status,
        ExperimentStatus::Running
    );
}

#[tokio::test]
async fn test_multiple_breached_thresholds_roll_back_once() {
    let mut thresholds = error_rate_threshold();
    thresholds.insert("response_time_ms".to_string(), 100.0);
    let f = fixture(thresholds).await;

    // Both metrics breached with enough samples
    record_treatment_errors(&f.metrics, 150, 0.50).await;
    for i in 0..150 {
        f.metrics
            .record_event(
                &format!("user-{}", i),
                "exp1",
                Variant::Treatment,
                "response_time_ms",
                5000.0,
            )
            .await;
    }

    let events = f.controller.monitor_experiments().await;
    assert_eq!(events.len(), 1, "first firing trigger short-circuits the pass");
    assert_eq!(f.channel.count(), 1);
}

#[tokio::test]
async fn test_custom_trigger_fires() {
    let f = fixture(BTreeMap::new()).await;

    f.controller
        .add_custom_trigger(
            RollbackTrigger::new("fallback_rate", 0.2, Comparison::Gte, 50).unwrap(),
        )
        .await;

    for i in 0..60 {
        f.metrics
            .record_event(
                &format!("user-{}", i),
                "exp1",
                Variant::Treatment,
                "fallback_rate",
                0.5,
            )
            .await;
    }

    let events = f.controller.monitor_experiments().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].metric_name, "fallback_rate");
}

#[tokio::test]
async fn test_concurrent_scans_roll_back_once() {
    let f = fixture(error_rate_threshold()).await;
    record_treatment_errors(&f.metrics, 200, 1.0).await;

    let controller = Arc::new(f.controller);
    let mut handles = Vec::new();
    for _ in 0..8 {
        let controller = controller.clone();
        handles.push(tokio::spawn(async move {
            controller.monitor_experiments().await.len()
        }));
    }

    let mut total = 0;
    for handle in handles {
        total += handle.await.unwrap();
    }

    assert_eq!(total, 1, "only one concurrent evaluation may win");
    assert_eq!(f.channel.count(), 1);
}

#[test]
fn test_invalid_custom_triggers_rejected_at_construction() {
    assert!(RollbackTrigger::new("", 0.1, Comparison::Gt, 10).is_err());
    assert!(RollbackTrigger::new("error_rate", -0.1, Comparison::Gt, 10).is_err());
    assert!(RollbackTrigger::new("error_rate", 0.1, Comparison::Gt, 0).is_err());
}
