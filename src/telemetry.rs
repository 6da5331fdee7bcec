//! Prometheus metrics for the crypto gateway
//!
//! Process-wide operational counters, separate from the per-experiment
//! aggregates in [`crate::metrics`]:
//! - Operation outcomes by algorithm
//! - Fallbacks by reason
//! - Operation latency
//! - Automatic rollbacks

use anyhow::Result;
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramVec, IntCounter, IntCounterVec, TextEncoder, opts,
    register_histogram_vec, register_int_counter, register_int_counter_vec,
};

/// Crypto operations by operation, algorithm actually used, and outcome
pub static CRYPTO_OPERATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "pqgate_crypto_operations_total",
            "Total crypto operations processed by the gateway"
        ),
        &["operation", "algorithm", "outcome"]
    )
    .expect("Failed to register CRYPTO_OPERATIONS_TOTAL metric")
});

/// Classical fallbacks by operation and reason category
pub static CRYPTO_FALLBACKS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "pqgate_crypto_fallbacks_total",
            "Total fallbacks from the post-quantum to the classical provider"
        ),
        &["operation", "reason"]
    )
    .expect("Failed to register CRYPTO_FALLBACKS_TOTAL metric")
});

/// Gateway operation duration in seconds
pub static CRYPTO_OPERATION_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "pqgate_crypto_operation_duration_seconds",
        "Crypto operation duration in seconds",
        &["operation"]
    )
    .expect("Failed to register CRYPTO_OPERATION_DURATION_SECONDS metric")
});

/// Experiments automatically rolled back
pub static EXPERIMENT_ROLLBACKS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "pqgate_experiment_rollbacks_total",
        "Total experiments automatically rolled back"
    ))
    .expect("Failed to register EXPERIMENT_ROLLBACKS_TOTAL metric")
});

/// Gather all registered metrics and encode as Prometheus text format
pub fn gather_metrics() -> Result<String> {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode(&metric_families, &mut buffer)?;

    Ok(String::from_utf8(buffer)?)
}
