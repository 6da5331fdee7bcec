// ============================================================================
// Experiment Registry (A/B testing)
// ============================================================================
//
// Holds experiment definitions and assigns users to control/treatment
// deterministically. Assignment hashes user_id + experiment_id so the same
// user is not correlated across experiments. No assignment table is stored;
// re-assignment after a percentage change is expected and acceptable.
//
// Status transitions are guarded: draft -> running, running -> completed,
// running -> failed. Failed and completed are terminal; an experiment never
// re-enters running automatically.
//
// ============================================================================

use crate::audit::AuditLogger;
use crate::config::Config;
use crate::error::{GateError, GateResult};
use crate::flags::PQC_ENCRYPTION_FLAG;
use crate::utils::percentage_bucket;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

pub const DEFAULT_EXPERIMENT_ID: &str = "pqc_rollout_v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    Control,
    Treatment,
}

impl Variant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Control => "control",
            Self::Treatment => "treatment",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStatus {
    Draft,
    Running,
    Completed,
    Failed,
}

impl ExperimentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Legal transitions only; failed/completed are terminal.
    fn can_transition_to(self, next: ExperimentStatus) -> bool {
        matches!(
            (self, next),
            (Self::Draft, Self::Running)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    pub experiment_id: String,
    pub name: String,
    pub target_feature_flag: String,
    pub control_percentage: u8,
    pub treatment_percentage: u8,
    pub success_metrics: Vec<String>,
    /// metric name -> threshold; treatment-arm average above a threshold
    /// trips automatic rollback. BTreeMap keeps evaluation order stable.
    pub failure_thresholds: BTreeMap<String, f64>,
    pub status: ExperimentStatus,
}

impl Experiment {
    /// True when this experiment gates a post-quantum rollout.
    pub fn is_pqc_experiment(&self) -> bool {
        self.target_feature_flag.starts_with("pqc_")
    }

    /// Deterministic variant for a user. Buckets beyond control + treatment
    /// fall back to control, the safer arm.
    fn variant_for(&self, user_id: &str) -> Variant {
        let bucket = percentage_bucket(&format!("{}{}", user_id, self.experiment_id));
        if bucket < self.control_percentage {
            Variant::Control
        } else if bucket < self.control_percentage + self.treatment_percentage {
            Variant::Treatment
        } else {
            Variant::Control
        }
    }
}

pub struct ExperimentRegistry {
    experiments: RwLock<HashMap<String, Experiment>>,
}

impl ExperimentRegistry {
    pub fn new() -> Self {
        Self {
            experiments: RwLock::new(HashMap::new()),
        }
    }

    /// Seeds the registry with the default PQC rollout experiment, already
    /// running, with error-rate and latency failure thresholds.
    pub fn with_defaults(config: &Config) -> Self {
        let mut failure_thresholds = BTreeMap::new();
        failure_thresholds.insert(
            "error_rate".to_string(),
            config.rollback.error_rate_threshold,
        );
        failure_thresholds.insert(
            "response_time_ms".to_string(),
            config.rollback.response_time_threshold_ms,
        );

        let experiment = Experiment {
            experiment_id: DEFAULT_EXPERIMENT_ID.to_string(),
            name: "Post-quantum crypto rollout".to_string(),
            target_feature_flag: PQC_ENCRYPTION_FLAG.to_string(),
            control_percentage: config.rollout.control_percentage,
            treatment_percentage: config.rollout.treatment_percentage,
            success_metrics: vec!["error_rate".to_string(), "response_time_ms".to_string()],
            failure_thresholds,
            status: ExperimentStatus::Running,
        };

        let mut experiments = HashMap::new();
        experiments.insert(experiment.experiment_id.clone(), experiment);
        Self {
            experiments: RwLock::new(experiments),
        }
    }

    pub async fn register(&self, experiment: Experiment) -> GateResult<()> {
        if experiment.control_percentage as u16 + experiment.treatment_percentage as u16 > 100 {
            return Err(GateError::InvalidConfiguration(format!(
                "control + treatment must not exceed 100 (got {} + {})",
                experiment.control_percentage, experiment.treatment_percentage
            )));
        }
        self.experiments
            .write()
            .await
            .insert(experiment.experiment_id.clone(), experiment);
        Ok(())
    }

    pub async fn get(&self, experiment_id: &str) -> Option<Experiment> {
        self.experiments.read().await.get(experiment_id).cloned()
    }

    pub async fn running(&self) -> Vec<Experiment> {
        self.experiments
            .read()
            .await
            .values()
            .filter(|e| e.status == ExperimentStatus::Running)
            .cloned()
            .collect()
    }

    /// Deterministically assigns a user to a variant.
    ///
    /// Unknown experiments always yield control. Bucket values beyond
    /// control + treatment also yield control, the safer arm.
    pub async fn assign_user_to_variant(&self, user_id: &str, experiment_id: &str) -> Variant {
        let experiments = self.experiments.read().await;
        match experiments.get(experiment_id) {
            Some(experiment) => experiment.variant_for(user_id),
            None => Variant::Control,
        }
    }

    /// True when the user lands in treatment for ANY running PQC experiment.
    pub async fn should_use_pqc(&self, user_id: &str) -> bool {
        let experiments = self.experiments.read().await;
        experiments.values().any(|e| {
            e.status == ExperimentStatus::Running
                && e.is_pqc_experiment()
                && e.variant_for(user_id) == Variant::Treatment
        })
    }

    /// The user's variant in every running PQC experiment, for metric
    /// attribution by the gateway.
    pub async fn running_pqc_assignments(&self, user_id: &str) -> Vec<(String, Variant)> {
        let experiments = self.experiments.read().await;
        let mut assignments: Vec<(String, Variant)> = experiments
            .values()
            .filter(|e| e.status == ExperimentStatus::Running && e.is_pqc_experiment())
            .map(|e| (e.experiment_id.clone(), e.variant_for(user_id)))
            .collect();
        assignments.sort_by(|a, b| a.0.cmp(&b.0));
        assignments
    }

    /// Guarded status update. Returns the previous status on success.
    pub async fn update_status(
        &self,
        experiment_id: &str,
        status: ExperimentStatus,
    ) -> GateResult<ExperimentStatus> {
        let mut experiments = self.experiments.write().await;
        let experiment = experiments
            .get_mut(experiment_id)
            .ok_or_else(|| GateError::UnknownExperiment(experiment_id.to_string()))?;

        if !experiment.status.can_transition_to(status) {
            return Err(GateError::InvalidTransition {
                from: experiment.status.as_str().to_string(),
                to: status.as_str().to_string(),
            });
        }

        let previous = experiment.status;
        experiment.status = status;
        AuditLogger::log_status_change(experiment_id, previous.as_str(), status.as_str());
        Ok(previous)
    }

    /// Atomically moves a running experiment to failed.
    ///
    /// The check-then-act happens under a single write lock, so two
    /// concurrent rollback evaluations cannot both win; exactly one caller
    /// sees `true`.
    pub async fn try_fail(&self, experiment_id: &str) -> bool {
        let mut experiments = self.experiments.write().await;
        match experiments.get_mut(experiment_id) {
            Some(experiment) if experiment.status == ExperimentStatus::Running => {
                experiment.status = ExperimentStatus::Failed;
                AuditLogger::log_status_change(experiment_id, "running", "failed");
                true
            }
            _ => false,
        }
    }
}

impl Default for ExperimentRegistry {
    fn default() -> Self {
        Self::new()
    }
}
