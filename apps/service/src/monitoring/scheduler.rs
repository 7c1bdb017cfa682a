//! The three periodic cycles: check sweep, log rotation and token expiry.
//!
//! Each cycle runs once immediately and then on its own period; none waits on
//! another. The check sweep only enqueues ids. A fixed pool of workers drains
//! the queue, and a full queue makes the sweep wait for space.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{Mutex as AsyncMutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use super::executor::MonitoringExecutor;
use crate::config;
use crate::database::{Collection, RecordStore, StoreError};
use crate::orchestrator::RetentionCleanup;

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub check_interval: Duration,
    pub log_rotation_interval: Duration,
    pub token_sweep_interval: Duration,
    pub workers: usize,
    pub queue_capacity: usize,
}

impl From<&config::Scheduler> for SchedulerSettings {
    fn from(config: &config::Scheduler) -> Self {
        Self {
            check_interval: Duration::from_secs(config.check_interval_seconds),
            log_rotation_interval: Duration::from_secs(config.log_rotation_interval_seconds),
            token_sweep_interval: Duration::from_secs(config.token_sweep_interval_seconds),
            workers: config.workers.max(1),
            queue_capacity: config.queue_capacity.max(1),
        }
    }
}

/// Check ids that are queued or being evaluated.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    ids: Arc<Mutex<HashSet<String>>>,
}

/// Releases its id when dropped.
#[derive(Debug)]
pub struct InFlightGuard {
    ids: Arc<Mutex<HashSet<String>>>,
    id: String,
}

impl InFlight {
    /// `None` if the id is already in flight.
    pub fn claim(&self, id: &str) -> Option<InFlightGuard> {
        let mut ids = self.ids.lock().unwrap_or_else(PoisonError::into_inner);
        if !ids.insert(id.to_string()) {
            return None;
        }
        Some(InFlightGuard { ids: Arc::clone(&self.ids), id: id.to_string() })
    }

    #[cfg(test)]
    pub fn contains(&self, id: &str) -> bool {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner).contains(id)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner).remove(&self.id);
    }
}

/// One queued evaluation. The id stays in flight until the job is dropped.
#[derive(Debug)]
pub struct Job {
    pub id: String,
    _guard: InFlightGuard,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub listed: usize,
    pub queued: usize,
    pub skipped_in_flight: usize,
}

pub struct MonitoringScheduler {
    store: Arc<dyn RecordStore>,
    executor: Arc<MonitoringExecutor>,
    retention: Arc<RetentionCleanup>,
    settings: SchedulerSettings,
    in_flight: InFlight,
}

/// Background tasks of a started scheduler.
pub struct SchedulerHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Wait for every cycle to stop and every worker to drain the queue.
    pub async fn join(self) {
        for result in join_all(self.tasks).await {
            if let Err(e) = result {
                error!(error = %e, "Scheduler task failed");
            }
        }
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Run `tick` now and then every `period` until `shutdown` flips or its sender
/// goes away.
fn spawn_cycle<F, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut timer = interval(period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(cycle = name, period_secs = period.as_secs(), "Cycle started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = timer.tick() => tick().await,
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!(cycle = name, "Cycle stopped");
    })
}

async fn work(worker: usize, executor: Arc<MonitoringExecutor>, queue: Arc<AsyncMutex<mpsc::Receiver<Job>>>) {
    loop {
        let job = queue.lock().await.recv().await;
        let Some(job) = job else { break };

        match executor.evaluate_check(&job.id).await {
            Ok(report) => debug!(worker, check_id = %job.id, state = %report.evaluation.state, "Evaluation done"),
            Err(e) => warn!(worker, check_id = %job.id, error = %e, "Check skipped"),
        }
    }
    debug!(worker, "Worker stopped");
}

impl MonitoringScheduler {
    /// Create a new scheduler. Nothing runs until [`MonitoringScheduler::start`].
    pub fn new(
        store: Arc<dyn RecordStore>,
        executor: Arc<MonitoringExecutor>,
        retention: Arc<RetentionCleanup>,
        settings: SchedulerSettings,
    ) -> Self {
        Self { store, executor, retention, settings, in_flight: InFlight::default() }
    }

    #[cfg(test)]
    pub fn in_flight(&self) -> &InFlight {
        &self.in_flight
    }

    /// Queue every check that is not already in flight.
    ///
    /// Waits for queue space but never for the evaluations themselves.
    pub async fn sweep_checks(&self, queue: &mpsc::Sender<Job>) -> Result<SweepReport, StoreError> {
        let ids = self.store.list(Collection::Checks).await?;
        let mut report = SweepReport { listed: ids.len(), ..Default::default() };

        for id in ids {
            let Some(guard) = self.in_flight.claim(&id) else {
                debug!(check_id = %id, "Still in flight, skipped");
                report.skipped_in_flight += 1;
                continue;
            };
            if queue.send(Job { id, _guard: guard }).await.is_err() {
                warn!("Worker pool is gone, abandoning sweep");
                break;
            }
            report.queued += 1;
        }

        Ok(report)
    }

    async fn run_check_sweep(&self, queue: &mpsc::Sender<Job>) {
        match self.sweep_checks(queue).await {
            Ok(report) => info!(
                listed = report.listed,
                queued = report.queued,
                skipped = report.skipped_in_flight,
                "Check sweep dispatched"
            ),
            Err(e) => error!(error = %e, "Could not list checks"),
        }
    }

    /// Spawn the worker pool and the three cycles.
    pub fn start(self, shutdown: watch::Receiver<bool>) -> SchedulerHandle {
        let this = Arc::new(self);
        let settings = this.settings.clone();
        let (sender, receiver) = mpsc::channel::<Job>(settings.queue_capacity);
        let receiver = Arc::new(AsyncMutex::new(receiver));

        let mut tasks: Vec<JoinHandle<()>> = (0..settings.workers)
            .map(|worker| tokio::spawn(work(worker, Arc::clone(&this.executor), Arc::clone(&receiver))))
            .collect();
        info!(workers = settings.workers, queue = settings.queue_capacity, "Worker pool started");

        // The sender lives in this closure: when the sweep cycle ends the
        // workers drain what is queued and exit.
        let sweeper = Arc::clone(&this);
        tasks.push(spawn_cycle("check-sweep", settings.check_interval, shutdown.clone(), move || {
            let sweeper = Arc::clone(&sweeper);
            let sender = sender.clone();
            async move { sweeper.run_check_sweep(&sender).await }
        }));

        let retention = Arc::clone(&this.retention);
        tasks.push(spawn_cycle("log-rotation", settings.log_rotation_interval, shutdown.clone(), move || {
            let retention = Arc::clone(&retention);
            async move {
                if let Err(e) = retention.rotate_logs(now_ms()).await {
                    error!(error = %e, "Could not list logs for rotation");
                }
            }
        }));

        let retention = Arc::clone(&this.retention);
        tasks.push(spawn_cycle("token-sweep", settings.token_sweep_interval, shutdown, move || {
            let retention = Arc::clone(&retention);
            async move {
                if let Err(e) = retention.clear_expired_tokens(now_ms()).await {
                    error!(error = %e, "Could not list tokens");
                }
            }
        }));

        SchedulerHandle { tasks }
    }
}
