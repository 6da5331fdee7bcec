//! Crypto provider capability interface.
//!
//! The set of providers is fixed and known at build time: a post-quantum
//! provider and a classical provider, both behind the same trait. The
//! gateway never inspects provider internals; it only attempts, observes
//! success or failure, and falls back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod classical;
#[cfg(feature = "post-quantum")]
pub mod post_quantum;

pub use classical::ClassicalProvider;
#[cfg(feature = "post-quantum")]
pub use post_quantum::MlKemProvider;

/// Algorithm family actually used for an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CryptoAlgorithm {
    PostQuantum,
    Classical,
}

impl CryptoAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PostQuantum => "post-quantum",
            Self::Classical => "classical",
        }
    }
}

/// Provider-level failure. Recovered by the gateway via classical fallback;
/// never surfaced to callers directly.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Provider backend not reachable (library load failure, subprocess
    /// gone, feature not compiled in)
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// Malformed input or internal crypto error
    #[error("operation failed: {0}")]
    OperationFailed(String),
}

impl ProviderError {
    /// Non-sensitive reason code for logs and metrics. Never includes key
    /// material or payload content.
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "provider_unavailable",
            Self::OperationFailed(_) => "operation_failed",
        }
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Capability interface shared by the post-quantum and classical providers.
///
/// Providers own their long-lived key material. `generate_keys` exports the
/// public half of a fresh keypair for external storage; secret material
/// never leaves the provider.
#[async_trait]
pub trait CryptoProvider: Send + Sync {
    fn algorithm(&self) -> CryptoAlgorithm;

    async fn generate_keys(&self) -> ProviderResult<Vec<u8>>;

    async fn encrypt(&self, plaintext: &[u8]) -> ProviderResult<Vec<u8>>;

    async fn decrypt(&self, ciphertext: &[u8]) -> ProviderResult<Vec<u8>>;

    async fn sign(&self, message: &[u8]) -> ProviderResult<Vec<u8>>;

    async fn verify(&self, message: &[u8], signature: &[u8]) -> ProviderResult<bool>;
}
