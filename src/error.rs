use thiserror::Error;

pub type GateResult<T> = Result<T, GateError>;

/// Crate-level error type.
///
/// Provider-level failures (unavailable, operation failed) are recovered
/// inside the gateway by classical fallback and never appear here; the only
/// crypto error that propagates to callers is `BothProvidersFailed`.
#[derive(Error, Debug)]
pub enum GateError {
    // ===== Fatal crypto errors =====
    #[error("both crypto providers failed for '{operation}': {detail}")]
    BothProvidersFailed { operation: String, detail: String },

    // ===== Configuration errors =====
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("feature flag '{0}' is protected and cannot be disabled")]
    ProtectedFlag(String),

    // ===== Registry errors =====
    #[error("unknown feature flag: {0}")]
    UnknownFlag(String),

    #[error("unknown experiment: {0}")]
    UnknownExperiment(String),

    #[error("invalid experiment status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}

impl GateError {
    /// Error code for programmatic handling and audit records
    pub fn error_code(&self) -> &'static str {
        match self {
            GateError::BothProvidersFailed { .. } => "BOTH_PROVIDERS_FAILED",
            GateError::InvalidConfiguration(_) => "INVALID_CONFIGURATION",
            GateError::ProtectedFlag(_) => "PROTECTED_FLAG",
            GateError::UnknownFlag(_) => "UNKNOWN_FLAG",
            GateError::UnknownExperiment(_) => "UNKNOWN_EXPERIMENT",
            GateError::InvalidTransition { .. } => "INVALID_TRANSITION",
        }
    }

    /// User-facing message with internal detail stripped.
    ///
    /// Provider error text must never reach an external surface; full detail
    /// stays in internal logs only.
    pub fn user_message(&self) -> String {
        match self {
            GateError::BothProvidersFailed { .. } => {
                "Cryptographic operation failed".to_string()
            }
            GateError::InvalidConfiguration(msg) => format!("Invalid configuration: {}", msg),
            GateError::ProtectedFlag(name) => {
                format!("Feature flag '{}' cannot be disabled", name)
            }
            GateError::UnknownFlag(_) | GateError::UnknownExperiment(_) => {
                "Unknown resource".to_string()
            }
            GateError::InvalidTransition { .. } => "Invalid status transition".to_string(),
        }
    }

    /// Log this error with appropriate level and context
    pub fn log(&self) {
        let code = self.error_code();
        match self {
            GateError::BothProvidersFailed { .. } => {
                tracing::error!(error = %self, error_code = %code, "Fatal crypto error");
            }
            GateError::ProtectedFlag(_) => {
                tracing::warn!(error = %self, error_code = %code, "Protected flag violation");
            }
            _ => {
                tracing::debug!(error = %self, error_code = %code, "Client error");
            }
        }
    }
}
