use anyhow::Result;
use std::collections::HashMap;

// ============================================================================
// Configuration Constants
// ============================================================================

// Post-quantum provider call budget. A timed-out call is treated the same as
// a provider error and falls back to the classical provider.
const DEFAULT_PQ_TIMEOUT_MS: u64 = 2000;

// Raw metric event retention
const DEFAULT_METRIC_RETENTION_DAYS: i64 = 30;
const DEFAULT_MAX_METRIC_EVENTS: usize = 100_000;

// Monitoring safety net
const DEFAULT_MAX_LATENCY_INCREASE: f64 = 2.0;
const DEFAULT_MAX_ERROR_RATE: f64 = 0.05;
const DEFAULT_ERROR_WINDOW: usize = 200;
const DEFAULT_MIN_ERROR_SAMPLES: usize = 20;

// Rollback evaluation
const DEFAULT_MIN_SAMPLE_SIZE: u64 = 100;
const DEFAULT_ERROR_RATE_THRESHOLD: f64 = 0.05;
const DEFAULT_RESPONSE_TIME_THRESHOLD_MS: f64 = 5000.0;

// Initial rollout split for the seeded experiment
const DEFAULT_CONTROL_PERCENTAGE: u8 = 95;
const DEFAULT_TREATMENT_PERCENTAGE: u8 = 5;

// Static latency baselines per operation (milliseconds)
const BASELINE_KEYGEN_MS: f64 = 50.0;
const BASELINE_ENCRYPT_MS: f64 = 10.0;
const BASELINE_DECRYPT_MS: f64 = 10.0;
const BASELINE_SIGN_MS: f64 = 15.0;
const BASELINE_VERIFY_MS: f64 = 5.0;

// ============================================================================
// Configuration Structures
// ============================================================================

/// Gateway execution policy
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    /// Budget for a single post-quantum provider call (milliseconds)
    pub pq_timeout_ms: u64,
    /// Salt for one-way user id hashing in metrics and audit records
    pub hash_salt: String,
}

/// Metric event retention policy
#[derive(Clone, Debug)]
pub struct MetricsConfig {
    /// Raw events older than this are pruned; aggregates are never rewritten
    pub retention_days: i64,
    /// Upper bound on the in-memory raw event log
    pub max_events: usize,
}

/// Baseline-comparison safety net, independent of the experiment machinery
#[derive(Clone, Debug)]
pub struct MonitoringConfig {
    /// Alert when current latency exceeds baseline by this multiplier
    pub max_latency_increase: f64,
    /// Alert when the rolling error rate for an operation exceeds this
    pub max_error_rate: f64,
    /// Rolling window size per operation
    pub error_window: usize,
    /// Error rate is not evaluated below this sample count
    pub min_error_samples: usize,
    /// Static per-operation latency baselines (milliseconds)
    pub latency_baselines_ms: HashMap<String, f64>,
}

/// Automatic experiment rollback policy
#[derive(Clone, Debug)]
pub struct RollbackConfig {
    /// Sample-size gate applied to every trigger derived from experiment
    /// failure thresholds
    pub min_sample_size: u64,
    /// Seeded error-rate threshold for the default experiment
    pub error_rate_threshold: f64,
    /// Seeded response-time threshold for the default experiment (ms)
    pub response_time_threshold_ms: f64,
}

/// Initial rollout split for seeded experiments
#[derive(Clone, Debug)]
pub struct RolloutConfig {
    pub control_percentage: u8,
    pub treatment_percentage: u8,
    /// Initial rollout percentage for the pqc_* feature flags
    pub pqc_rollout_percentage: u8,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub metrics: MetricsConfig,
    pub monitoring: MonitoringConfig,
    pub rollback: RollbackConfig,
    pub rollout: RolloutConfig,
}

impl Config {
    /// Loads configuration from environment variables with documented
    /// defaults. Invalid values are rejected here, never stored.
    pub fn from_env() -> Result<Self> {
        let hash_salt = std::env::var("PQGATE_HASH_SALT").unwrap_or_else(|_| {
            tracing::warn!(
                "PQGATE_HASH_SALT not set - using a default salt. \
                Hashed identifiers will not be stable across deployments."
            );
            "pqgate-default-salt".to_string()
        });

        let rollout = RolloutConfig {
            control_percentage: env_parse("PQGATE_CONTROL_PERCENTAGE", DEFAULT_CONTROL_PERCENTAGE),
            treatment_percentage: env_parse(
                "PQGATE_TREATMENT_PERCENTAGE",
                DEFAULT_TREATMENT_PERCENTAGE,
            ),
            pqc_rollout_percentage: env_parse("PQGATE_PQC_ROLLOUT_PERCENTAGE", 0),
        };

        if rollout.control_percentage as u16 + rollout.treatment_percentage as u16 > 100 {
            anyhow::bail!(
                "control + treatment percentages must not exceed 100 (got {} + {})",
                rollout.control_percentage,
                rollout.treatment_percentage
            );
        }
        if rollout.pqc_rollout_percentage > 100 {
            anyhow::bail!(
                "PQGATE_PQC_ROLLOUT_PERCENTAGE must be in [0, 100] (got {})",
                rollout.pqc_rollout_percentage
            );
        }

        let mut latency_baselines_ms = HashMap::new();
        latency_baselines_ms.insert("keygen".to_string(), BASELINE_KEYGEN_MS);
        latency_baselines_ms.insert("encrypt".to_string(), BASELINE_ENCRYPT_MS);
        latency_baselines_ms.insert("decrypt".to_string(), BASELINE_DECRYPT_MS);
        latency_baselines_ms.insert("sign".to_string(), BASELINE_SIGN_MS);
        latency_baselines_ms.insert("verify".to_string(), BASELINE_VERIFY_MS);

        Ok(Self {
            gateway: GatewayConfig {
                pq_timeout_ms: env_parse("PQGATE_PQ_TIMEOUT_MS", DEFAULT_PQ_TIMEOUT_MS),
                hash_salt,
            },
            metrics: MetricsConfig {
                retention_days: env_parse(
                    "PQGATE_METRIC_RETENTION_DAYS",
                    DEFAULT_METRIC_RETENTION_DAYS,
                ),
                max_events: env_parse("PQGATE_MAX_METRIC_EVENTS", DEFAULT_MAX_METRIC_EVENTS),
            },
            monitoring: MonitoringConfig {
                max_latency_increase: env_parse(
                    "PQGATE_MAX_LATENCY_INCREASE",
                    DEFAULT_MAX_LATENCY_INCREASE,
                ),
                max_error_rate: env_parse("PQGATE_MAX_ERROR_RATE", DEFAULT_MAX_ERROR_RATE),
                error_window: env_parse("PQGATE_ERROR_WINDOW", DEFAULT_ERROR_WINDOW),
                min_error_samples: env_parse(
                    "PQGATE_MIN_ERROR_SAMPLES",
                    DEFAULT_MIN_ERROR_SAMPLES,
                ),
                latency_baselines_ms,
            },
            rollback: RollbackConfig {
                min_sample_size: env_parse("PQGATE_MIN_SAMPLE_SIZE", DEFAULT_MIN_SAMPLE_SIZE),
                error_rate_threshold: env_parse(
                    "PQGATE_ERROR_RATE_THRESHOLD",
                    DEFAULT_ERROR_RATE_THRESHOLD,
                ),
                response_time_threshold_ms: env_parse(
                    "PQGATE_RESPONSE_TIME_THRESHOLD_MS",
                    DEFAULT_RESPONSE_TIME_THRESHOLD_MS,
                ),
            },
            rollout,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut latency_baselines_ms = HashMap::new();
        latency_baselines_ms.insert("keygen".to_string(), BASELINE_KEYGEN_MS);
        latency_baselines_ms.insert("encrypt".to_string(), BASELINE_ENCRYPT_MS);
        latency_baselines_ms.insert("decrypt".to_string(), BASELINE_DECRYPT_MS);
        latency_baselines_ms.insert("sign".to_string(), BASELINE_SIGN_MS);
        latency_baselines_ms.insert("verify".to_string(), BASELINE_VERIFY_MS);

        Self {
            gateway: GatewayConfig {
                pq_timeout_ms: DEFAULT_PQ_TIMEOUT_MS,
                hash_salt: "pqgate-default-salt".to_string(),
            },
            metrics: MetricsConfig {
                retention_days: DEFAULT_METRIC_RETENTION_DAYS,
                max_events: DEFAULT_MAX_METRIC_EVENTS,
            },
            monitoring: MonitoringConfig {
                max_latency_increase: DEFAULT_MAX_LATENCY_INCREASE,
                max_error_rate: DEFAULT_MAX_ERROR_RATE,
                error_window: DEFAULT_ERROR_WINDOW,
                min_error_samples: DEFAULT_MIN_ERROR_SAMPLES,
                latency_baselines_ms,
            },
            rollback: RollbackConfig {
                min_sample_size: DEFAULT_MIN_SAMPLE_SIZE,
                error_rate_threshold: DEFAULT_ERROR_RATE_THRESHOLD,
                response_time_threshold_ms: DEFAULT_RESPONSE_TIME_THRESHOLD_MS,
            },
            rollout: RolloutConfig {
                control_percentage: DEFAULT_CONTROL_PERCENTAGE,
                treatment_percentage: DEFAULT_TREATMENT_PERCENTAGE,
                pqc_rollout_percentage: 0,
            },
        }
    }
}

fn env_parse<T: std::str::FromStr>(var: &str, default: T) -> T {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
