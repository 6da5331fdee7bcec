// ============================================================================
// Monitoring Service - Baseline Safety Net
// ============================================================================
//
// Second, simpler safety net alongside the rollback controller, fed from a
// different data source on purpose: static per-operation latency baselines
// and a rolling per-operation error window, instead of per-experiment
// aggregates. A bug in one net does not silently disable the other.
//
// Alerts here are informational: they notify and log, they never flip
// experiment status.
//
// ============================================================================

use crate::config::Config;
use crate::notify::{Notification, Notifier, Severity};
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct MonitoringService {
    /// Static latency baselines per operation (milliseconds)
    baselines_ms: HashMap<String, f64>,
    max_latency_increase: f64,
    max_error_rate: f64,
    error_window: usize,
    min_error_samples: usize,
    /// Rolling success/failure window per operation
    recent: RwLock<HashMap<String, VecDeque<bool>>>,
    notifier: Arc<Notifier>,
}

impl MonitoringService {
    pub fn new(config: &Config, notifier: Arc<Notifier>) -> Self {
        Self {
            baselines_ms: config.monitoring.latency_baselines_ms.clone(),
            max_latency_increase: config.monitoring.max_latency_increase,
            max_error_rate: config.monitoring.max_error_rate,
            error_window: config.monitoring.error_window,
            min_error_samples: config.monitoring.min_error_samples,
            recent: RwLock::new(HashMap::new()),
            notifier,
        }
    }

    /// Records one operation outcome and evaluates both alert conditions.
    pub async fn record_operation(&self, operation: &str, latency_ms: f64, success: bool) {
        let error_rate = {
            let mut recent = self.recent.write().await;
            let window = recent.entry(operation.to_string()).or_default();
            if window.len() >= self.error_window {
                window.pop_front();
            }
            window.push_back(success);

            if window.len() >= self.min_error_samples {
                let failures = window.iter().filter(|ok| !**ok).count();
                Some(failures as f64 / window.len() as f64)
            } else {
                None
            }
        };

        if let Some(baseline) = self.baselines_ms.get(operation) {
            let ratio = latency_ms / baseline;
            if ratio > self.max_latency_increase {
                self.raise_degradation_alert(operation, latency_ms, *baseline, ratio)
                    .await;
            }
        }

        if let Some(rate) = error_rate {
            if rate > self.max_error_rate {
                self.raise_error_rate_alert(operation, rate).await;
            }
        }
    }

    /// Current rolling error rate, if enough samples have been observed.
    pub async fn error_rate(&self, operation: &str) -> Option<f64> {
        let recent = self.recent.read().await;
        let window = recent.get(operation)?;
        if window.len() < self.min_error_samples {
            return None;
        }
        let failures = window.iter().filter(|ok| !**ok).count();
        Some(failures as f64 / window.len() as f64)
    }

    async fn raise_degradation_alert(
        &self,
        operation: &str,
        latency_ms: f64,
        baseline_ms: f64,
        ratio: f64,
    ) {
        tracing::warn!(
            operation,
            latency_ms,
            baseline_ms,
            ratio,
            "Performance degradation detected"
        );
        self.notifier
            .broadcast(&Notification {
                severity: Severity::Warning,
                title: format!("Performance degradation: {}", operation),
                body: format!(
                    "latency {:.1}ms is {:.1}x the {:.1}ms baseline",
                    latency_ms, ratio, baseline_ms
                ),
                experiment_id: None,
                metric: Some("response_time_ms".to_string()),
                observed_value: Some(latency_ms),
                threshold: Some(baseline_ms * self.max_latency_increase),
                timestamp: Utc::now(),
            })
            .await;
    }

    async fn raise_error_rate_alert(&self, operation: &str, rate: f64) {
        tracing::error!(operation, error_rate = rate, "High error rate detected");
        self.notifier
            .broadcast(&Notification {
                severity: Severity::Critical,
                title: format!("High error rate: {}", operation),
                body: format!(
                    "rolling error rate {:.3} exceeds limit {:.3}",
                    rate, self.max_error_rate
                ),
                experiment_id: None,
                metric: Some("error_rate".to_string()),
                observed_value: Some(rate),
                threshold: Some(self.max_error_rate),
                timestamp: Utc::now(),
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotificationChannel;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingChannel {
        notifications: Mutex<Vec<Notification>>,
    }

    #[async_trait]
    impl NotificationChannel for RecordingChannel {
        fn name(&self) -> &str {
            "recording"
        }

        async fn send(&self, notification: &Notification) -> anyhow::Result<()> {
            self.notifications.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    async fn service_with_channel() -> (MonitoringService, Arc<RecordingChannel>) {
        let notifier = Arc::new(Notifier::new());
        let channel = Arc::new(RecordingChannel {
            notifications: Mutex::new(Vec::new()),
        });
        notifier.register(channel.clone()).await;
        let service = MonitoringService::new(&Config::default(), notifier);
        (service, channel)
    }

    #[tokio::test]
    async fn test_latency_within_baseline_no_alert() {
        let (service, channel) = service_with_channel().await;
        service.record_operation("encrypt", 5.0, true).await;
        assert!(channel.notifications.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_latency_above_baseline_alerts() {
        let (service, channel) = service_with_channel().await;
        // encrypt baseline is 10ms, multiplier 2.0 -> 100ms trips
        service.record_operation("encrypt", 100.0, true).await;

        let notifications = channel.notifications.lock().unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].severity, Severity::Warning);
    }

    #[tokio::test]
    async fn test_error_rate_needs_minimum_samples() {
        let (service, channel) = service_with_channel().await;
        // 5 failures out of 5 is 100%, but below min_error_samples (20)
        for _ in 0..5 {
            service.record_operation("sign", 1.0, false).await;
        }
        assert!(channel.notifications.lock().unwrap().is_empty());
        assert!(service.error_rate("sign").await.is_none());
    }

    #[tokio::test]
    async fn test_error_rate_alert_after_enough_samples() {
        let (service, channel) = service_with_channel().await;
        for _ in 0..25 {
            service.record_operation("sign", 1.0, false).await;
        }

        let notifications = channel.notifications.lock().unwrap();
        assert!(!notifications.is_empty());
        assert!(notifications
            .iter()
            .any(|n| n.severity == Severity::Critical));
        drop(notifications);

        let rate = service.error_rate("sign").await.unwrap();
        assert!((rate - 1.0).abs() < 1e-9);
    }
}
