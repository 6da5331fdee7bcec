use crate::config::Config;
use crate::experiments::ExperimentRegistry;
use crate::flags::FeatureFlagRegistry;
use crate::gateway::HybridCryptoGateway;
use crate::metrics::MetricsCollector;
use crate::monitoring::MonitoringService;
use crate::notify::Notifier;
use crate::providers::CryptoProvider;
use crate::rollback::RollbackController;
use std::sync::Arc;

/// Application context containing shared dependencies.
///
/// Registries and collectors are explicit, constructor-injected, long-lived
/// service objects rather than ambient global state, so tests can construct
/// isolated instances per case. The rollback controller owns no scheduling
/// loop; hosts call `rollback.monitor_experiments()` on their own cadence.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub flags: Arc<FeatureFlagRegistry>,
    pub experiments: Arc<ExperimentRegistry>,
    pub metrics: Arc<MetricsCollector>,
    pub monitoring: Arc<MonitoringService>,
    pub notifier: Arc<Notifier>,
    pub gateway: Arc<HybridCryptoGateway>,
    pub rollback: Arc<RollbackController>,
}

impl AppContext {
    /// Wires the full subsystem from one configuration and a pair of
    /// providers, with default flags and the seeded rollout experiment.
    pub fn new(
        config: Config,
        pq_provider: Arc<dyn CryptoProvider>,
        classical_provider: Arc<dyn CryptoProvider>,
    ) -> Self {
        let flags = Arc::new(FeatureFlagRegistry::with_defaults(&config));
        let experiments = Arc::new(ExperimentRegistry::with_defaults(&config));
        Self::with_registries(config, pq_provider, classical_provider, flags, experiments)
    }

    /// Same wiring with caller-supplied registries, for hosts that seed
    /// their own flags and experiments.
    pub fn with_registries(
        config: Config,
        pq_provider: Arc<dyn CryptoProvider>,
        classical_provider: Arc<dyn CryptoProvider>,
        flags: Arc<FeatureFlagRegistry>,
        experiments: Arc<ExperimentRegistry>,
    ) -> Self {
        let notifier = Arc::new(Notifier::new());
        let metrics = Arc::new(MetricsCollector::new(&config));
        let monitoring = Arc::new(MonitoringService::new(&config, notifier.clone()));
        let gateway = Arc::new(HybridCryptoGateway::new(
            &config,
            pq_provider,
            classical_provider,
            flags.clone(),
            experiments.clone(),
            metrics.clone(),
            monitoring.clone(),
        ));
        let rollback = Arc::new(RollbackController::new(
            &config,
            experiments.clone(),
            metrics.clone(),
            notifier.clone(),
        ));

        Self {
            config: Arc::new(config),
            flags,
            experiments,
            metrics,
            monitoring,
            notifier,
            gateway,
            rollback,
        }
    }
}
