// Gateway Fallback Tests
// ============================================================================
//
// Verifies the hybrid execution contract:
// 1. Post-quantum success is tagged and involves no fallback
// 2. Any post-quantum failure falls back to classical transparently
// 3. A hung post-quantum provider is bounded by the timeout
// 4. Both providers failing is the only fatal outcome
// 5. Outcomes are recorded into experiment metrics and monitoring
//
// ============================================================================

use pqgate::config::Config;
use pqgate::context::AppContext;
use pqgate::error::GateError;
use pqgate::experiments::{Experiment, ExperimentRegistry, ExperimentStatus, Variant};
use pqgate::flags::FeatureFlagRegistry;
use pqgate::gateway::{CryptoOperation, FallbackReason};
use pqgate::providers::{ClassicalProvider, CryptoAlgorithm};
use std::collections::BTreeMap;
use std::sync::Arc;

use test_utils::*;

/// An experiment that puts every user in treatment, so the PQ path is
/// always attempted.
fn all_treatment_experiment(id: &str) -> Experiment {
    Experiment {
        experiment_id: id.to_string(),
        name: id.to_string(),
        target_feature_flag: "pqc_encryption".to_string(),
        control_percentage: 0,
        treatment_percentage: 100,
        success_metrics: vec!["error_rate".to_string()],
        failure_thresholds: BTreeMap::new(),
        status: ExperimentStatus::Running,
    }
}

async fn context_with_providers(
    pq: Arc<dyn pqgate::providers::CryptoProvider>,
    classical: Arc<dyn pqgate::providers::CryptoProvider>,
) -> AppContext {
    let config = Config::default();
    let flags = Arc::new(FeatureFlagRegistry::with_defaults(&config));
    let experiments = Arc::new(ExperimentRegistry::new());
    experiments
        .register(all_treatment_experiment("exp-pq"))
        .await
        .unwrap();
    AppContext::with_registries(config, pq, classical, flags, experiments)
}

#[tokio::test]
async fn test_pq_success_no_fallback() {
    let pq = Arc::new(StubProvider::post_quantum());
    let ctx = context_with_providers(pq.clone(), Arc::new(ClassicalProvider::generate())).await;

    let result = ctx
        .gateway
        .execute(
            CryptoOperation::Encrypt {
                plaintext: b"payload".to_vec(),
            },
            "alice",
        )
        .await
        .unwrap();

    assert_eq!(result.algorithm_used, CryptoAlgorithm::PostQuantum);
    assert!(!result.fallback_used);
    assert!(result.fallback_reason.is_none());
    assert!(!result.output.is_empty());
    assert!(result.success);
    assert_eq!(pq.call_count(), 1);
}

#[tokio::test]
async fn test_pq_failure_falls_back_to_classical() {
    let ctx = context_with_providers(
        Arc::new(FailingProvider::post_quantum()),
        Arc::new(ClassicalProvider::generate()),
    )
    .await;

    let result = ctx
        .gateway
        .execute(
            CryptoOperation::Encrypt {
                plaintext: b"payload".to_vec(),
            },
            "alice",
        )
        .await
        .unwrap();

    assert_eq!(result.algorithm_used, CryptoAlgorithm::Classical);
    assert!(result.fallback_used);
    assert_eq!(result.fallback_reason, Some(FallbackReason::OperationFailed));
    assert!(!result.output.is_empty());
}

#[tokio::test]
async fn test_pq_unavailable_reason_is_categorized() {
    let ctx = context_with_providers(
        Arc::new(FailingProvider::post_quantum_unavailable()),
        Arc::new(ClassicalProvider::generate()),
    )
    .await;

    let result = ctx
        .gateway
        .execute(CryptoOperation::KeyGen, "alice")
        .await
        .unwrap();

    assert_eq!(
        result.fallback_reason,
        Some(FallbackReason::ProviderUnavailable)
    );
    assert_eq!(result.algorithm_used, CryptoAlgorithm::Classical);
}

#[tokio::test]
async fn test_hanging_pq_provider_times_out_and_falls_back() {
    let mut config = Config::default();
    config.gateway.pq_timeout_ms = 50;

    let flags = Arc::new(FeatureFlagRegistry::with_defaults(&config));
    let experiments = Arc::new(ExperimentRegistry::new());
    experiments
        .register(all_treatment_experiment("exp-pq"))
        .await
        .unwrap();
    let ctx = AppContext::with_registries(
        config,
        Arc::new(HangingProvider),
        Arc::new(ClassicalProvider::generate()),
        flags,
        experiments,
    );

    let result = ctx
        .gateway
        .execute(
            CryptoOperation::Sign {
                message: b"msg".to_vec(),
            },
            "alice",
        )
        .await
        .unwrap();

    assert_eq!(result.fallback_reason, Some(FallbackReason::Timeout));
    assert_eq!(result.algorithm_used, CryptoAlgorithm::Classical);
}

#[tokio::test]
async fn test_both_providers_failing_is_fatal() {
    let ctx = context_with_providers(
        Arc::new(FailingProvider::post_quantum()),
        Arc::new(FailingProvider::classical()),
    )
    .await;

    let result = ctx
        .gateway
        .execute(
            CryptoOperation::Encrypt {
                plaintext: b"payload".to_vec(),
            },
            "alice",
        )
        .await;

    match result {
        Err(GateError::BothProvidersFailed { operation, .. }) => {
            assert_eq!(operation, "encrypt");
        }
        other => panic!("expected BothProvidersFailed, got {:?}", other.map(|r| r.algorithm_used)),
    }
}

#[tokio::test]
async fn test_fatal_error_user_message_is_generic() {
    let ctx = context_with_providers(
        Arc::new(FailingProvider::post_quantum()),
        Arc::new(FailingProvider::classical()),
    )
    .await;

    let error = ctx
        .gateway
        .execute(CryptoOperation::KeyGen, "alice")
        .await
        .unwrap_err();

    // Internal provider detail must never leak into the user-facing text
    let message = error.user_message();
    assert_eq!(message, "Cryptographic operation failed");
    assert!(!message.contains("internal crypto error"));
}

#[tokio::test]
async fn test_classical_round_trip_through_gateway() {
    let ctx = context_with_providers(
        Arc::new(FailingProvider::post_quantum()),
        Arc::new(ClassicalProvider::generate()),
    )
    .await;

    let encrypted = ctx
        .gateway
        .execute(
            CryptoOperation::Encrypt {
                plaintext: b"round trip".to_vec(),
            },
            "alice",
        )
        .await
        .unwrap();

    let decrypted = ctx
        .gateway
        .execute(
            CryptoOperation::Decrypt {
                ciphertext: encrypted.output,
            },
            "alice",
        )
        .await
        .unwrap();

    assert_eq!(decrypted.output, b"round trip");
}

#[tokio::test]
async fn test_verify_operation_reports_result() {
    let classical = Arc::new(ClassicalProvider::generate());
    let ctx = context_with_providers(Arc::new(FailingProvider::post_quantum()), classical).await;

    let signed = ctx
        .gateway
        .execute(
            CryptoOperation::Sign {
                message: b"document".to_vec(),
            },
            "alice",
        )
        .await
        .unwrap();

    let verified = ctx
        .gateway
        .execute(
            CryptoOperation::Verify {
                message: b"document".to_vec(),
                signature: signed.output.clone(),
            },
            "alice",
        )
        .await
        .unwrap();
    assert_eq!(verified.verified, Some(true));

    let mismatched = ctx
        .gateway
        .execute(
            CryptoOperation::Verify {
                message: b"tampered".to_vec(),
                signature: signed.output,
            },
            "alice",
        )
        .await
        .unwrap();
    assert_eq!(mismatched.verified, Some(false));
}

#[tokio::test]
async fn test_outcomes_recorded_into_experiment_metrics() {
    let ctx = context_with_providers(
        Arc::new(StubProvider::post_quantum()),
        Arc::new(ClassicalProvider::generate()),
    )
    .await;

    for user in ["alice", "bob", "carol"] {
        ctx.gateway
            .execute(
                CryptoOperation::Encrypt {
                    plaintext: b"payload".to_vec(),
                },
                user,
            )
            .await
            .unwrap();
    }

    // Everyone is in treatment for exp-pq; each call records error_rate and
    // response_time_ms
    let aggregate = ctx
        .metrics
        .aggregate("exp-pq", Variant::Treatment, "error_rate")
        .await
        .unwrap();
    assert_eq!(aggregate.count, 3);
    assert!(aggregate.avg.abs() < 1e-9, "all operations succeeded");

    let latency = ctx
        .metrics
        .aggregate("exp-pq", Variant::Treatment, "response_time_ms")
        .await
        .unwrap();
    assert_eq!(latency.count, 3);
    assert!(latency.min >= 0.0);
}

#[tokio::test]
async fn test_control_user_takes_classical_path_without_fallback_tag() {
    // No experiments, no flag rollout: nothing selects the PQ path
    let config = Config::default();
    let flags = Arc::new(FeatureFlagRegistry::with_defaults(&config));
    let experiments = Arc::new(ExperimentRegistry::new());
    let pq = Arc::new(StubProvider::post_quantum());
    let ctx = AppContext::with_registries(
        config,
        pq.clone(),
        Arc::new(ClassicalProvider::generate()),
        flags,
        experiments,
    );

    let result = ctx
        .gateway
        .execute(
            CryptoOperation::Encrypt {
                plaintext: b"payload".to_vec(),
            },
            "alice",
        )
        .await
        .unwrap();

    assert_eq!(result.algorithm_used, CryptoAlgorithm::Classical);
    assert!(!result.fallback_used, "classical by routing is not a fallback");
    assert_eq!(pq.call_count(), 0, "PQ provider must not be attempted");
}
