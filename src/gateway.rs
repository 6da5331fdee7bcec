// ============================================================================
// Hybrid Crypto Gateway
// ============================================================================
//
// The sole entry point for cryptographic operations. Eligibility for the
// post-quantum path is decided by the flag and experiment registries; this
// component only executes and falls back.
//
// Execution: if the post-quantum path was selected, the PQ provider is
// invoked under an explicit timeout. Any failure (unavailable, operation
// error, timeout, empty output) is caught, logged with a reason code, and
// recovered by invoking the classical provider. If the classical provider
// also fails, the operation is fatal: two-level fallback only, no
// degradation chains.
//
// Every invocation reports latency and outcome to the monitoring service,
// the Prometheus registry, and (when the user participates in a running PQC
// experiment) the experiment metrics collector.
//
// ============================================================================

use crate::audit::AuditLogger;
use crate::config::Config;
use crate::error::{GateError, GateResult};
use crate::experiments::ExperimentRegistry;
use crate::flags::{AlgorithmChoice, FeatureFlagRegistry};
use crate::metrics::MetricsCollector;
use crate::monitoring::MonitoringService;
use crate::providers::{CryptoAlgorithm, CryptoProvider, ProviderError};
use crate::telemetry;
use crate::utils::hash_user_id;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

/// Closed set of gateway operations.
#[derive(Debug, Clone)]
pub enum CryptoOperation {
    KeyGen,
    Encrypt { plaintext: Vec<u8> },
    Decrypt { ciphertext: Vec<u8> },
    Sign { message: Vec<u8> },
    Verify { message: Vec<u8>, signature: Vec<u8> },
}

impl CryptoOperation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::KeyGen => "keygen",
            Self::Encrypt { .. } => "encrypt",
            Self::Decrypt { .. } => "decrypt",
            Self::Sign { .. } => "sign",
            Self::Verify { .. } => "verify",
        }
    }
}

/// Why the classical provider was used instead of the post-quantum one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    ProviderUnavailable,
    OperationFailed,
    Timeout,
}

impl FallbackReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProviderUnavailable => "provider_unavailable",
            Self::OperationFailed => "operation_failed",
            Self::Timeout => "timeout",
        }
    }
}

/// Outcome of one gateway call. Callers never need the algorithm metadata to
/// proceed; it exists for audit and logging.
#[derive(Debug, Clone, Serialize)]
pub struct CryptoOperationResult {
    pub algorithm_used: CryptoAlgorithm,
    pub fallback_used: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<FallbackReason>,
    /// Ciphertext, plaintext, signature or key bundle depending on the
    /// operation; empty for verify
    #[serde(skip)]
    pub output: Vec<u8>,
    /// Only set for verify operations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified: Option<bool>,
    pub latency_ms: f64,
    pub success: bool,
}

/// What a single provider attempt produced.
enum AttemptOutput {
    Bytes(Vec<u8>),
    Verified(bool),
}

pub struct HybridCryptoGateway {
    pq_provider: Arc<dyn CryptoProvider>,
    classical_provider: Arc<dyn CryptoProvider>,
    flags: Arc<FeatureFlagRegistry>,
    experiments: Arc<ExperimentRegistry>,
    metrics: Arc<MetricsCollector>,
    monitoring: Arc<MonitoringService>,
    pq_timeout: Duration,
    hash_salt: String,
}

impl HybridCryptoGateway {
    pub fn new(
        config: &Config,
        pq_provider: Arc<dyn CryptoProvider>,
        classical_provider: Arc<dyn CryptoProvider>,
        flags: Arc<FeatureFlagRegistry>,
        experiments: Arc<ExperimentRegistry>,
        metrics: Arc<MetricsCollector>,
        monitoring: Arc<MonitoringService>,
    ) -> Self {
        Self {
            pq_provider,
            classical_provider,
            flags,
            experiments,
            metrics,
            monitoring,
            pq_timeout: Duration::from_millis(config.gateway.pq_timeout_ms),
            hash_salt: config.gateway.hash_salt.clone(),
        }
    }

    /// Executes one operation for a user, attempting the post-quantum
    /// provider first when the rollout machinery selects it, and falling
    /// back to the classical provider on any PQ failure.
    ///
    /// Only [`GateError::BothProvidersFailed`] ever propagates from here.
    pub async fn execute(
        &self,
        operation: CryptoOperation,
        user_id: &str,
    ) -> GateResult<CryptoOperationResult> {
        let started = Instant::now();
        let op_name = operation.name();

        let attempt_pq = match self.flags.algorithm_for_user(op_name, Some(user_id)).await {
            AlgorithmChoice::PostQuantum => true,
            AlgorithmChoice::Hybrid => self.experiments.should_use_pqc(user_id).await,
        };

        let mut fallback_reason: Option<FallbackReason> = None;

        let outcome = if attempt_pq {
            match self.attempt(&self.pq_provider, &operation).await {
                Ok(output) => Ok((CryptoAlgorithm::PostQuantum, output)),
                Err(reason) => {
                    tracing::warn!(
                        operation = op_name,
                        reason = reason.as_str(),
                        "Post-quantum provider failed, falling back to classical"
                    );
                    telemetry::CRYPTO_FALLBACKS_TOTAL
                        .with_label_values(&[op_name, reason.as_str()])
                        .inc();
                    fallback_reason = Some(reason);
                    self.attempt(&self.classical_provider, &operation)
                        .await
                        .map(|output| (CryptoAlgorithm::Classical, output))
                }
            }
        } else {
            self.attempt(&self.classical_provider, &operation)
                .await
                .map(|output| (CryptoAlgorithm::Classical, output))
        };

        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        let success = outcome.is_ok();

        self.record_outcome(op_name, user_id, latency_ms, success, &outcome)
            .await;

        match outcome {
            Ok((algorithm, output)) => {
                let (output, verified) = match output {
                    AttemptOutput::Bytes(bytes) => (bytes, None),
                    AttemptOutput::Verified(ok) => (Vec::new(), Some(ok)),
                };
                Ok(CryptoOperationResult {
                    algorithm_used: algorithm,
                    fallback_used: fallback_reason.is_some(),
                    fallback_reason,
                    output,
                    verified,
                    latency_ms,
                    success: true,
                })
            }
            Err(reason) => {
                let user_hash = hash_user_id(user_id, &self.hash_salt);
                AuditLogger::log_crypto_failure(op_name, &user_hash, reason.as_str());
                let error = GateError::BothProvidersFailed {
                    operation: op_name.to_string(),
                    detail: reason.as_str().to_string(),
                };
                error.log();
                Err(error)
            }
        }
    }

    /// Runs one operation on one provider under the configured time budget,
    /// normalizing every failure mode into a fallback reason. Output is
    /// sanity-checked: an empty ciphertext or signature from a provider is
    /// treated as an operation failure, never as a usable result.
    async fn attempt(
        &self,
        provider: &Arc<dyn CryptoProvider>,
        operation: &CryptoOperation,
    ) -> Result<AttemptOutput, FallbackReason> {
        let call = async {
            match operation {
                CryptoOperation::KeyGen => provider.generate_keys().await.map(AttemptOutput::Bytes),
                CryptoOperation::Encrypt { plaintext } => {
                    provider.encrypt(plaintext).await.map(AttemptOutput::Bytes)
                }
                CryptoOperation::Decrypt { ciphertext } => {
                    provider.decrypt(ciphertext).await.map(AttemptOutput::Bytes)
                }
                CryptoOperation::Sign { message } => {
                    provider.sign(message).await.map(AttemptOutput::Bytes)
                }
                CryptoOperation::Verify { message, signature } => provider
                    .verify(message, signature)
                    .await
                    .map(AttemptOutput::Verified),
            }
        };

        let result = match timeout(self.pq_timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                return Err(FallbackReason::Timeout);
            }
        };

        match result {
            Ok(AttemptOutput::Bytes(bytes)) => {
                let empty_output_is_error = !matches!(operation, CryptoOperation::Decrypt { .. });
                if bytes.is_empty() && empty_output_is_error {
                    return Err(FallbackReason::OperationFailed);
                }
                Ok(AttemptOutput::Bytes(bytes))
            }
            Ok(verified @ AttemptOutput::Verified(_)) => Ok(verified),
            Err(ProviderError::Unavailable(detail)) => {
                tracing::debug!(detail = %detail, "Provider unavailable");
                Err(FallbackReason::ProviderUnavailable)
            }
            Err(ProviderError::OperationFailed(detail)) => {
                tracing::debug!(detail = %detail, "Provider operation failed");
                Err(FallbackReason::OperationFailed)
            }
        }
    }

    /// Reports one outcome to the monitoring safety net, the Prometheus
    /// registry, and the experiment metrics for every running PQC experiment
    /// the user participates in.
    async fn record_outcome(
        &self,
        op_name: &str,
        user_id: &str,
        latency_ms: f64,
        success: bool,
        outcome: &Result<(CryptoAlgorithm, AttemptOutput), FallbackReason>,
    ) {
        self.monitoring
            .record_operation(op_name, latency_ms, success)
            .await;

        let algorithm = match outcome {
            Ok((algorithm, _)) => algorithm.as_str(),
            Err(_) => CryptoAlgorithm::Classical.as_str(),
        };
        telemetry::CRYPTO_OPERATIONS_TOTAL
            .with_label_values(&[op_name, algorithm, if success { "success" } else { "failure" }])
            .inc();
        telemetry::CRYPTO_OPERATION_DURATION_SECONDS
            .with_label_values(&[op_name])
            .observe(latency_ms / 1000.0);

        for (experiment_id, variant) in self.experiments.running_pqc_assignments(user_id).await {
            self.metrics
                .record_event(
                    user_id,
                    &experiment_id,
                    variant,
                    "error_rate",
                    if success { 0.0 } else { 1.0 },
                )
                .await;
            self.metrics
                .record_event(user_id, &experiment_id, variant, "response_time_ms", latency_ms)
                .await;
        }
    }
}
