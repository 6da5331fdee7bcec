// ============================================================================
// Audit Logging - Security-Critical Operations
// ============================================================================
//
// Structured audit records for the rollout subsystem:
// - Automatic experiment rollbacks
// - Experiment status changes
// - Feature flag mutations (including rejected attempts on protected flags)
// - Fatal crypto failures (both providers failed)
//
// Audit records are append-only, JSON-structured for SIEM ingestion, and
// privacy-preserving: only hashed identifiers ever appear in them.
//
// ============================================================================

use chrono::Utc;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventType {
    /// Automatic rollback fired by the rollback controller
    ExperimentRollback,
    /// Any experiment status transition
    ExperimentStatusChange,
    /// Flag enable/disable/percentage change, successful or rejected
    FlagMutation,
    /// Both crypto providers failed for an operation
    CryptoFailure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Event timestamp (ISO8601)
    pub timestamp: String,

    pub event_type: AuditEventType,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub experiment_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub flag: Option<String>,

    /// User ID (hashed for privacy)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id_hash: Option<String>,

    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl AuditEvent {
    pub fn new(
        event_type: AuditEventType,
        experiment_id: Option<String>,
        flag: Option<String>,
        user_id_hash: Option<String>,
        success: bool,
        details: Option<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            event_type,
            experiment_id,
            flag,
            user_id_hash,
            success,
            details,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

pub struct AuditLogger;

impl AuditLogger {
    /// Logs an automatic rollback, including the triggering metric.
    pub fn log_rollback(experiment_id: &str, metric: &str, observed: f64, threshold: f64) {
        let event = AuditEvent::new(
            AuditEventType::ExperimentRollback,
            Some(experiment_id.to_string()),
            None,
            None,
            true,
            Some(format!(
                "metric={} observed={} threshold={}",
                metric, observed, threshold
            )),
        );
        Self::log_event(&event);
    }

    pub fn log_status_change(experiment_id: &str, from: &str, to: &str) {
        let event = AuditEvent::new(
            AuditEventType::ExperimentStatusChange,
            Some(experiment_id.to_string()),
            None,
            None,
            true,
            Some(format!("{} -> {}", from, to)),
        );
        Self::log_event(&event);
    }

    pub fn log_flag_mutation(flag: &str, action: &str, success: bool, details: Option<String>) {
        let event = AuditEvent::new(
            AuditEventType::FlagMutation,
            None,
            Some(flag.to_string()),
            None,
            success,
            Some(match details {
                Some(d) => format!("action={} {}", action, d),
                None => format!("action={}", action),
            }),
        );
        Self::log_event(&event);
    }

    /// Logs a fatal crypto failure. Reason codes only; never key material,
    /// plaintext, or raw provider error text from external callers' view.
    pub fn log_crypto_failure(operation: &str, user_id_hash: &str, reason_code: &str) {
        let event = AuditEvent::new(
            AuditEventType::CryptoFailure,
            None,
            None,
            Some(user_id_hash.to_string()),
            false,
            Some(format!("operation={} reason={}", operation, reason_code)),
        );
        Self::log_event(&event);
    }

    fn log_event(event: &AuditEvent) {
        let json = event.to_json();

        // INFO level with structured fields so log aggregation systems can
        // parse and index audit events
        tracing::info!(
            target: "audit",
            event_type = ?event.event_type,
            experiment_id = event.experiment_id.as_deref(),
            flag = event.flag.as_deref(),
            user_id_hash = event.user_id_hash.as_deref(),
            success = event.success,
            details = event.details.as_deref(),
            timestamp = %event.timestamp,
            json = %json,
            "AUDIT: Security event logged"
        );
    }
}
