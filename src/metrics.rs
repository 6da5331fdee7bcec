//! In-memory experiment metrics collection.
//!
//! Every gateway outcome (and any custom instrumented caller) pushes events
//! here. Events are folded into per-(experiment, variant, metric) running
//! aggregates and appended to a bounded raw log. User ids are hashed one-way
//! before storage; no reversal capability exists anywhere in this crate.
//!
//! Aggregates are cumulative for the experiment's lifetime. Retention
//! pruning only trims the raw event log: aggregates answer "all time since
//! experiment start", the raw log answers "recent activity" for debugging
//! and audit.

use crate::config::Config;
use crate::experiments::Variant;
use crate::utils::hash_user_id;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricEvent {
    pub timestamp: DateTime<Utc>,
    /// One-way salted hash, fixed length, never the raw id
    pub hashed_user_id: String,
    pub experiment_id: String,
    pub variant: Variant,
    pub metric_name: String,
    pub metric_value: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MetricAggregate {
    pub count: u64,
    pub sum: f64,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
}

impl MetricAggregate {
    fn first(value: f64) -> Self {
        Self {
            count: 1,
            sum: value,
            avg: value,
            min: value,
            max: value,
        }
    }

    fn fold(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.avg = self.sum / self.count as f64;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }
}

/// Aggregates for one experiment, split by arm.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExperimentMetrics {
    pub control: HashMap<String, MetricAggregate>,
    pub treatment: HashMap<String, MetricAggregate>,
}

type AggregateKey = (String, Variant, String);

struct Inner {
    events: VecDeque<MetricEvent>,
    aggregates: HashMap<AggregateKey, MetricAggregate>,
}

pub struct MetricsCollector {
    inner: RwLock<Inner>,
    hash_salt: String,
    max_events: usize,
}

impl MetricsCollector {
    pub fn new(config: &Config) -> Self {
        Self {
            inner: RwLock::new(Inner {
                events: VecDeque::new(),
                aggregates: HashMap::new(),
            }),
            hash_salt: config.gateway.hash_salt.clone(),
            max_events: config.metrics.max_events,
        }
    }

    /// Records one metric event. O(1) amortized, in-memory only.
    ///
    /// The aggregate update happens under a single write lock, so count,
    /// sum, min and max always move together even under concurrent writers.
    pub async fn record_event(
        &self,
        user_id: &str,
        experiment_id: &str,
        variant: Variant,
        metric_name: &str,
        metric_value: f64,
    ) {
        let event = MetricEvent {
            timestamp: Utc::now(),
            hashed_user_id: hash_user_id(user_id, &self.hash_salt),
            experiment_id: experiment_id.to_string(),
            variant,
            metric_name: metric_name.to_string(),
            metric_value,
        };

        let mut inner = self.inner.write().await;
        if inner.events.len() >= self.max_events {
            inner.events.pop_front();
        }
        inner.events.push_back(event);

        let key = (
            experiment_id.to_string(),
            variant,
            metric_name.to_string(),
        );
        inner
            .aggregates
            .entry(key)
            .and_modify(|aggregate| aggregate.fold(metric_value))
            .or_insert_with(|| MetricAggregate::first(metric_value));
    }

    /// Aggregates for one experiment only; other experiments' data never
    /// leaks into the result.
    pub async fn get_experiment_metrics(&self, experiment_id: &str) -> ExperimentMetrics {
        let inner = self.inner.read().await;
        let mut metrics = ExperimentMetrics::default();
        for ((exp, variant, metric), aggregate) in &inner.aggregates {
            if exp != experiment_id {
                continue;
            }
            let arm = match variant {
                Variant::Control => &mut metrics.control,
                Variant::Treatment => &mut metrics.treatment,
            };
            arm.insert(metric.clone(), *aggregate);
        }
        metrics
    }

    /// Single aggregate lookup, used by the rollback controller.
    pub async fn aggregate(
        &self,
        experiment_id: &str,
        variant: Variant,
        metric_name: &str,
    ) -> Option<MetricAggregate> {
        let key = (
            experiment_id.to_string(),
            variant,
            metric_name.to_string(),
        );
        self.inner.read().await.aggregates.get(&key).copied()
    }

    /// Drops raw events older than the retention cutoff. Aggregates are not
    /// recomputed. Returns the number of events removed.
    pub async fn clear_old_events(&self, retention_days: i64) -> usize {
        let cutoff = Utc::now() - Duration::days(retention_days);
        let mut inner = self.inner.write().await;
        let before = inner.events.len();
        inner.events.retain(|e| e.timestamp >= cutoff);
        before - inner.events.len()
    }

    /// The most recent `limit` raw events, oldest first / most-recent-last.
    pub async fn get_recent_events(&self, limit: usize) -> Vec<MetricEvent> {
        let inner = self.inner.read().await;
        let skip = inner.events.len().saturating_sub(limit);
        inner.events.iter().skip(skip).cloned().collect()
    }

    pub async fn event_count(&self) -> usize {
        self.inner.read().await.events.len()
    }
}
