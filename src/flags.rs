// ============================================================================
// Feature Flag Registry
// ============================================================================
//
// Named boolean flags with per-flag rollout percentages. Resolution is a
// pure function of (flag state, user id): the same user gets the same answer
// for the same flag as long as the percentage is unchanged, with no stored
// per-user state.
//
// The "hybrid_mode" flag is protected and can never be disabled: classical
// fallback must always remain available.
//
// ============================================================================

use crate::audit::AuditLogger;
use crate::config::Config;
use crate::error::{GateError, GateResult};
use crate::utils::percentage_bucket;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Protected safety default; disabling it must fail.
pub const HYBRID_MODE_FLAG: &str = "hybrid_mode";

pub const PQC_ENCRYPTION_FLAG: &str = "pqc_encryption";
pub const PQC_SIGNATURES_FLAG: &str = "pqc_signatures";
pub const PQC_KEY_GENERATION_FLAG: &str = "pqc_key_generation";

/// Which algorithm family a routing decision resolved to.
///
/// `Hybrid` means "classical unless an experiment opts the user in" and is
/// the safe default for unknown operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlgorithmChoice {
    PostQuantum,
    Hybrid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureFlag {
    pub name: String,
    pub enabled: bool,
    /// Only meaningful while enabled; forced to 0 on disable
    pub rollout_percentage: u8,
}

pub struct FeatureFlagRegistry {
    flags: RwLock<HashMap<String, FeatureFlag>>,
}

impl FeatureFlagRegistry {
    pub fn new() -> Self {
        Self {
            flags: RwLock::new(HashMap::new()),
        }
    }

    /// Seeds the registry with the standard flag set: the protected
    /// hybrid_mode flag plus one flag per post-quantum operation family.
    pub fn with_defaults(config: &Config) -> Self {
        let pct = config.rollout.pqc_rollout_percentage;
        let mut flags = HashMap::new();
        for (name, enabled, rollout) in [
            (HYBRID_MODE_FLAG, true, 100),
            (PQC_ENCRYPTION_FLAG, pct > 0, pct),
            (PQC_SIGNATURES_FLAG, pct > 0, pct),
            (PQC_KEY_GENERATION_FLAG, pct > 0, pct),
        ] {
            flags.insert(
                name.to_string(),
                FeatureFlag {
                    name: name.to_string(),
                    enabled,
                    rollout_percentage: if enabled { rollout } else { 0 },
                },
            );
        }
        Self {
            flags: RwLock::new(flags),
        }
    }

    /// Registers or replaces a flag definition.
    pub async fn register(&self, flag: FeatureFlag) -> GateResult<()> {
        if flag.rollout_percentage > 100 {
            return Err(GateError::InvalidConfiguration(format!(
                "rollout percentage must be in [0, 100] (got {})",
                flag.rollout_percentage
            )));
        }
        self.flags.write().await.insert(flag.name.clone(), flag);
        Ok(())
    }

    /// Resolves a flag for an optional user.
    ///
    /// Unknown flags and globally disabled flags resolve to false (safe
    /// default = classical-only). An enabled flag with no user resolves to
    /// true; with a user, the user's stable bucket is compared against the
    /// rollout percentage.
    pub async fn is_enabled(&self, name: &str, user_id: Option<&str>) -> bool {
        let flags = self.flags.read().await;
        let Some(flag) = flags.get(name) else {
            return false;
        };
        if !flag.enabled {
            return false;
        }
        match user_id {
            None => true,
            Some(user) => percentage_bucket(user) < flag.rollout_percentage,
        }
    }

    pub async fn enable_flag(&self, name: &str) -> GateResult<()> {
        let mut flags = self.flags.write().await;
        let flag = flags
            .get_mut(name)
            .ok_or_else(|| GateError::UnknownFlag(name.to_string()))?;
        flag.enabled = true;
        AuditLogger::log_flag_mutation(name, "enable", true, None);
        Ok(())
    }

    /// Disables a flag and forces its rollout percentage to 0.
    ///
    /// Disabling hybrid_mode is rejected; the attempt is audit-logged.
    pub async fn disable_flag(&self, name: &str) -> GateResult<()> {
        if name == HYBRID_MODE_FLAG {
            AuditLogger::log_flag_mutation(
                name,
                "disable",
                false,
                Some("protected flag".to_string()),
            );
            return Err(GateError::ProtectedFlag(name.to_string()));
        }
        let mut flags = self.flags.write().await;
        let flag = flags
            .get_mut(name)
            .ok_or_else(|| GateError::UnknownFlag(name.to_string()))?;
        flag.enabled = false;
        flag.rollout_percentage = 0;
        AuditLogger::log_flag_mutation(name, "disable", true, None);
        Ok(())
    }

    pub async fn update_rollout_percentage(&self, name: &str, percentage: u8) -> GateResult<()> {
        if percentage > 100 {
            return Err(GateError::InvalidConfiguration(format!(
                "rollout percentage must be in [0, 100] (got {})",
                percentage
            )));
        }
        let mut flags = self.flags.write().await;
        let flag = flags
            .get_mut(name)
            .ok_or_else(|| GateError::UnknownFlag(name.to_string()))?;
        flag.rollout_percentage = percentage;
        AuditLogger::log_flag_mutation(
            name,
            "update_rollout_percentage",
            true,
            Some(format!("percentage={}", percentage)),
        );
        Ok(())
    }

    pub async fn get_flag(&self, name: &str) -> Option<FeatureFlag> {
        self.flags.read().await.get(name).cloned()
    }

    /// Maps a gateway operation to the flag governing it and resolves the
    /// algorithm choice for the user. Unknown operations never error; they
    /// default to hybrid/safe mode.
    pub async fn algorithm_for_user(&self, operation: &str, user_id: Option<&str>) -> AlgorithmChoice {
        // hybrid_mode off would mean no classical fallback guarantee; it is
        // invariant-protected, but check anyway before attempting PQ.
        if !self.is_enabled(HYBRID_MODE_FLAG, None).await {
            return AlgorithmChoice::Hybrid;
        }
        let flag_name = match operation {
            "encrypt" | "decrypt" => PQC_ENCRYPTION_FLAG,
            "sign" | "verify" => PQC_SIGNATURES_FLAG,
            "keygen" => PQC_KEY_GENERATION_FLAG,
            _ => return AlgorithmChoice::Hybrid,
        };
        if self.is_enabled(flag_name, user_id).await {
            AlgorithmChoice::PostQuantum
        } else {
            AlgorithmChoice::Hybrid
        }
    }
}

impl Default for FeatureFlagRegistry {
    fn default() -> Self {
        Self::new()
    }
}
