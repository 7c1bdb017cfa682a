/// Orchestrator module - wires the engine together and runs it
///
/// The orchestrator:
/// - Opens the record store and the audit log from the configuration
/// - Builds the prober, evaluator and alert dispatcher
/// - Starts the scheduler and stops it on Ctrl-C
pub mod retention;


pub use retention::RetentionCleanup;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::alerting::{AlertDispatcher, transport_from_config};
use crate::audit::AuditLog;
use crate::config::Config;
use crate::database::FileStore;
use crate::monitoring::checker::HttpProber;
use crate::monitoring::evaluator::OutcomeEvaluator;
use crate::monitoring::scheduler::SchedulerSettings;
use crate::monitoring::{MonitoringExecutor, MonitoringScheduler};

/// The persistent state every command works on.
pub struct Storage {
    pub store: Arc<FileStore>,
    pub audit: Arc<AuditLog>,
}

impl Storage {
    /// Create the data and log directories if needed.
    pub async fn open(config: &Config) -> Result<Self> {
        let store = FileStore::open(&config.storage.data_dir)
            .await
            .with_context(|| format!("opening data directory {}", config.storage.data_dir.display()))?;
        let audit = AuditLog::open(&config.storage.logs_dir)
            .await
            .with_context(|| format!("opening logs directory {}", config.storage.logs_dir.display()))?;
        Ok(Self { store: Arc::new(store), audit: Arc::new(audit) })
    }
}

/// Main orchestrator for the monitoring engine
pub struct Orchestrator {
    scheduler: MonitoringScheduler,
}

impl Orchestrator {
    /// Build the engine and run it until Ctrl-C.
    pub async fn start(config: Config) -> Result<()> {
        let orchestrator = Self::new(&config).await?;
        orchestrator.run().await
    }

    async fn new(config: &Config) -> Result<Self> {
        let Storage { store, audit } = Storage::open(config).await?;

        if !config.sms.has_credentials() {
            warn!("No SMS credentials configured, alerts will only be logged");
        }
        let alerts = Arc::new(AlertDispatcher::new(transport_from_config(&config.sms)));
        let prober = Arc::new(HttpProber::new().context("building HTTP client")?);

        let evaluator = OutcomeEvaluator::new(store.clone(), audit.clone(), alerts);
        let executor = Arc::new(MonitoringExecutor::new(store.clone(), prober, evaluator));
        let retention = Arc::new(RetentionCleanup::new(store.clone(), audit));
        let scheduler =
            MonitoringScheduler::new(store, executor, retention, SchedulerSettings::from(&config.scheduler));

        Ok(Self { scheduler })
    }

    async fn run(self) -> Result<()> {
        info!("Starting monitoring engine");
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = self.scheduler.start(shutdown_rx);

        tokio::signal::ctrl_c().await.context("listening for Ctrl-C")?;
        info!("Shutdown requested, draining in-flight checks");

        // Receivers may already be gone if every task ended on its own.
        let _ = shutdown_tx.send(true);
        handle.join().await;

        info!("Monitoring engine stopped");
        Ok(())
    }
}
