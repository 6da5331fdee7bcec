// ============================================================================
// Rollback Controller
// ============================================================================
//
// Watches running experiments and flips a treatment to the terminal failed
// state when its aggregated metrics breach a trigger. The scan is driven by
// an external scheduler calling monitor_experiments(); this module owns no
// timer or background task.
//
// Trigger evaluation rules:
// - Only treatment-arm aggregates are consulted.
// - A trigger with fewer samples than its min_sample_size NEVER fires, no
//   matter how extreme the average looks. This trades detection speed for
//   false-positive avoidance: one catastrophic-looking early data point
//   must not kill an experiment.
// - Triggers are checked in configured order and short-circuit on the first
//   hit, so a single pass produces at most one rollback per experiment.
//
// The status transition is the authoritative act and happens first, under
// the registry's write lock; notification fan-out is best-effort afterwards.
//
// ============================================================================

use crate::audit::AuditLogger;
use crate::config::Config;
use crate::error::{GateError, GateResult};
use crate::experiments::{Experiment, ExperimentRegistry, Variant};
use crate::metrics::MetricsCollector;
use crate::notify::{Notification, Notifier, Severity};
use crate::telemetry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Gt,
    Lt,
    Gte,
    Lte,
}

impl Comparison {
    pub fn evaluate(&self, observed: f64, threshold: f64) -> bool {
        match self {
            Self::Gt => observed > threshold,
            Self::Lt => observed < threshold,
            Self::Gte => observed >= threshold,
            Self::Lte => observed <= threshold,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gt => "gt",
            Self::Lt => "lt",
            Self::Gte => "gte",
            Self::Lte => "lte",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackTrigger {
    pub metric_name: String,
    pub threshold_value: f64,
    pub comparison: Comparison,
    pub min_sample_size: u64,
}

impl RollbackTrigger {
    /// Validates at construction; a malformed trigger is rejected here and
    /// never reaches evaluation.
    pub fn new(
        metric_name: impl Into<String>,
        threshold_value: f64,
        comparison: Comparison,
        min_sample_size: u64,
    ) -> GateResult<Self> {
        let metric_name = metric_name.into();
        if metric_name.trim().is_empty() {
            return Err(GateError::InvalidConfiguration(
                "trigger metric name must not be empty".to_string(),
            ));
        }
        if !threshold_value.is_finite() || threshold_value < 0.0 {
            return Err(GateError::InvalidConfiguration(format!(
                "trigger threshold must be a non-negative number (got {})",
                threshold_value
            )));
        }
        if min_sample_size == 0 {
            return Err(GateError::InvalidConfiguration(
                "trigger min_sample_size must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            metric_name,
            threshold_value,
            comparison,
            min_sample_size,
        })
    }
}

/// Record of one rollback, returned from the scan and useful for hosts that
/// persist rollback history.
#[derive(Debug, Clone, Serialize)]
pub struct RollbackEvent {
    pub experiment_id: String,
    pub metric_name: String,
    pub observed_value: f64,
    pub threshold_value: f64,
    pub sample_count: u64,
    pub timestamp: DateTime<Utc>,
}

pub struct RollbackController {
    experiments: Arc<ExperimentRegistry>,
    metrics: Arc<MetricsCollector>,
    notifier: Arc<Notifier>,
    /// Sample-size gate for triggers derived from experiment thresholds
    default_min_sample_size: u64,
    /// Additional operator-supplied triggers, applied to every experiment
    custom_triggers: RwLock<Vec<RollbackTrigger>>,
}

impl RollbackController {
    pub fn new(
        config: &Config,
        experiments: Arc<ExperimentRegistry>,
        metrics: Arc<MetricsCollector>,
        notifier: Arc<Notifier>,
    ) -> Self {
        Self {
            experiments,
            metrics,
            notifier,
            default_min_sample_size: config.rollback.min_sample_size,
            custom_triggers: RwLock::new(Vec::new()),
        }
    }

    /// Adds an operator-supplied trigger. The trigger was already validated
    /// by [`RollbackTrigger::new`].
    pub async fn add_custom_trigger(&self, trigger: RollbackTrigger) {
        self.custom_triggers.write().await.push(trigger);
    }

    /// Scans all running experiments once. Expected to be invoked on a fixed
    /// schedule by the host. Returns the rollbacks that fired in this pass.
    pub async fn monitor_experiments(&self) -> Vec<RollbackEvent> {
        let running = self.experiments.running().await;
        let mut events = Vec::new();
        for experiment in running {
            if let Some(event) = self.check_rollback_conditions(&experiment).await {
                events.push(event);
            }
        }
        events
    }

    /// Evaluates all triggers for one experiment, in order: thresholds
    /// configured on the experiment first, then custom triggers. The first
    /// trigger that fires rolls the experiment back and ends the pass for
    /// this experiment.
    pub async fn check_rollback_conditions(&self, experiment: &Experiment) -> Option<RollbackEvent> {
        let triggers = self.triggers_for(experiment).await;

        for trigger in &triggers {
            let Some(aggregate) = self
                .metrics
                .aggregate(&experiment.experiment_id, Variant::Treatment, &trigger.metric_name)
                .await
            else {
                continue;
            };

            // Insufficient sample size never triggers rollback.
            if aggregate.count < trigger.min_sample_size {
                continue;
            }

            if trigger
                .comparison
                .evaluate(aggregate.avg, trigger.threshold_value)
            {
                return self
                    .execute_rollback(experiment, trigger, aggregate.avg, aggregate.count)
                    .await;
            }
        }
        None
    }

    async fn triggers_for(&self, experiment: &Experiment) -> Vec<RollbackTrigger> {
        let mut triggers: Vec<RollbackTrigger> = experiment
            .failure_thresholds
            .iter()
            .map(|(metric, threshold)| RollbackTrigger {
                metric_name: metric.clone(),
                threshold_value: *threshold,
                comparison: Comparison::Gt,
                min_sample_size: self.default_min_sample_size,
            })
            .collect();
        triggers.extend(self.custom_triggers.read().await.iter().cloned());
        triggers
    }

    /// The status transition is the authoritative act: it happens first and
    /// unconditionally. If another evaluation of the same experiment won the
    /// race, nothing more happens here (no duplicate notifications).
    async fn execute_rollback(
        &self,
        experiment: &Experiment,
        trigger: &RollbackTrigger,
        observed: f64,
        sample_count: u64,
    ) -> Option<RollbackEvent> {
        if !self.experiments.try_fail(&experiment.experiment_id).await {
            return None;
        }

        telemetry::EXPERIMENT_ROLLBACKS_TOTAL.inc();
        AuditLogger::log_rollback(
            &experiment.experiment_id,
            &trigger.metric_name,
            observed,
            trigger.threshold_value,
        );
        tracing::error!(
            experiment_id = %experiment.experiment_id,
            metric = %trigger.metric_name,
            observed,
            threshold = trigger.threshold_value,
            sample_count,
            "Experiment rolled back"
        );

        let event = RollbackEvent {
            experiment_id: experiment.experiment_id.clone(),
            metric_name: trigger.metric_name.clone(),
            observed_value: observed,
            threshold_value: trigger.threshold_value,
            sample_count,
            timestamp: Utc::now(),
        };

        // Best-effort: delivery failures never undo the transition above.
        self.notifier
            .broadcast(&Notification {
                severity: Severity::Critical,
                title: format!("Experiment rolled back: {}", experiment.experiment_id),
                body: format!(
                    "treatment {} averaged {:.4} against threshold {:.4} over {} samples",
                    trigger.metric_name, observed, trigger.threshold_value, sample_count,
                ),
                experiment_id: Some(experiment.experiment_id.clone()),
                metric: Some(trigger.metric_name.clone()),
                observed_value: Some(observed),
                threshold: Some(trigger.threshold_value),
                timestamp: event.timestamp,
            })
            .await;

        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_validation() {
        assert!(RollbackTrigger::new("error_rate", 0.05, Comparison::Gt, 100).is_ok());
        assert!(RollbackTrigger::new("", 0.05, Comparison::Gt, 100).is_err());
        assert!(RollbackTrigger::new("error_rate", -1.0, Comparison::Gt, 100).is_err());
        assert!(RollbackTrigger::new("error_rate", f64::NAN, Comparison::Gt, 100).is_err());
        assert!(RollbackTrigger::new("error_rate", 0.05, Comparison::Gt, 0).is_err());
    }

    #[test]
    fn test_comparison_operators() {
        assert!(Comparison::Gt.evaluate(0.2, 0.1));
        assert!(!Comparison::Gt.evaluate(0.1, 0.1));
        assert!(Comparison::Gte.evaluate(0.1, 0.1));
        assert!(Comparison::Lt.evaluate(0.1, 0.2));
        assert!(!Comparison::Lt.evaluate(0.2, 0.2));
        assert!(Comparison::Lte.evaluate(0.2, 0.2));
    }
}
