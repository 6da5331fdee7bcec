//! pqgate: hybrid post-quantum/classical crypto operation layer with
//! experiment-driven rollout and automatic rollback.
//!
//! A caller asks the gateway to perform a cryptographic operation for a
//! user. The feature-flag and experiment registries decide whether that
//! user's request attempts the post-quantum path; the gateway executes it
//! with transparent classical fallback; outcomes stream into the metrics
//! collector and monitoring service; and the rollback controller watches
//! aggregated treatment metrics, disabling an experiment when thresholds
//! are breached.
//!
//! The crate owns no HTTP surface, storage, or scheduler. Hosts call
//! [`rollback::RollbackController::monitor_experiments`] on a fixed
//! schedule and may expose [`telemetry::gather_metrics`] on a /metrics
//! endpoint.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod audit;
pub mod config;
pub mod context;
pub mod error;
pub mod experiments;
pub mod flags;
pub mod gateway;
pub mod metrics;
pub mod monitoring;
pub mod notify;
pub mod providers;
pub mod rollback;
pub mod telemetry;
pub mod utils;

pub use config::Config;
pub use context::AppContext;
pub use error::{GateError, GateResult};
pub use experiments::{Experiment, ExperimentRegistry, ExperimentStatus, Variant};
pub use flags::{AlgorithmChoice, FeatureFlagRegistry, HYBRID_MODE_FLAG};
pub use gateway::{CryptoOperation, CryptoOperationResult, FallbackReason, HybridCryptoGateway};
pub use metrics::{MetricAggregate, MetricsCollector};
pub use monitoring::MonitoringService;
pub use notify::{Notification, NotificationChannel, Notifier, Severity};
pub use providers::{ClassicalProvider, CryptoAlgorithm, CryptoProvider};
pub use rollback::{Comparison, RollbackController, RollbackTrigger};

/// Initializes tracing with an env-filter layer. Intended for host binaries
/// and examples; library code never installs a subscriber on its own.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
