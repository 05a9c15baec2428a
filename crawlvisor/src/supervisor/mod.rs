//! The job supervisor.
//!
//! A [`Supervisor`] owns every table the supervision logic touches: the job
//! catalog, the status store, the registry of processes it spawned, the
//! failure counter and the per-job locks. It is shared as an `Arc` between
//! the control API and two background loops:
//!
//! - the status poller, which notices exits and records their outcome
//! - the detector, which reaps persisted runs nobody owns and force-stops
//!   runs that outlived their timeout
//!
//! Everything that changes one job's state (launch, stop, completion,
//! reaping, timeout) happens under that job's lock, so a job never has two
//! registry entries and persisted state is never overwritten by a stale
//! observer.

mod control;
mod detector;
mod failures;
mod poller;
mod registry;

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::SupervisorSettings;
use crate::db::StatusStore;
use crate::error::SupervisorError;
use crate::models::{
    ActiveRun, Health, JobCatalog, JobDefinition, JobReport, JobState, LogEntry, ResetOutcome,
};
use crate::process::Identity;

pub use failures::FailureCounter;
pub use registry::{JobLocks, ProcessRegistry, TrackedProcess};

pub struct Supervisor {
    settings: SupervisorSettings,
    catalog: JobCatalog,
    store: Arc<StatusStore>,
    registry: ProcessRegistry,
    failures: FailureCounter,
    locks: JobLocks,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("jobs", &self.catalog.len())
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl Supervisor {
    /// Build the supervisor and reconcile persisted state with the OS.
    ///
    /// The startup scan completes before this returns, so callers never
    /// observe runs left behind by a previous instance.
    pub async fn start(
        settings: SupervisorSettings,
        catalog: JobCatalog,
        store: StatusStore,
    ) -> Arc<Self> {
        let supervisor = Arc::new(Self {
            settings,
            catalog,
            store: Arc::new(store),
            registry: ProcessRegistry::new(),
            failures: FailureCounter::new(),
            locks: JobLocks::new(),
        });

        let reaped = supervisor.startup_scan().await;
        tracing::info!(
            jobs = supervisor.catalog.len(),
            reaped,
            persistence = ?supervisor.store.backend_kind(),
            "supervisor ready"
        );
        supervisor
    }

    pub const fn catalog(&self) -> &JobCatalog {
        &self.catalog
    }

    pub const fn settings(&self) -> &SupervisorSettings {
        &self.settings
    }

    pub fn store(&self) -> &StatusStore {
        &self.store
    }

    /// Status, failure count and recent logs for every job.
    pub async fn status(&self) -> BTreeMap<String, JobReport> {
        let mut reports = BTreeMap::new();
        for name in self.catalog.names() {
            let status = self.store.get_status(name).await;
            let run = status.active_run();
            reports.insert(
                name.to_string(),
                JobReport {
                    state: status.state,
                    last_run: status.last_run,
                    pid: run.map(|run| run.pid),
                    start_time: run.map(|run| run.start_time),
                    failure_count: self.failures.get(name).await,
                    logs: self.store.get_logs(name, crate::db::LOG_RETENTION).await,
                },
            );
        }
        reports
    }

    pub async fn logs(&self, name: &str, limit: usize) -> Result<Vec<LogEntry>, SupervisorError> {
        self.definition(name)?;
        Ok(self.store.get_logs(name, limit).await)
    }

    pub async fn reset_failure_count(&self, name: &str) -> ResetOutcome {
        if !self.catalog.contains(name) {
            return ResetOutcome::NotFound;
        }
        self.failures.reset(name).await;
        self.store.add_log(name, "failure count reset", Utc::now()).await;
        tracing::info!(job = name, "failure count reset");
        ResetOutcome::Success
    }

    pub async fn health(&self) -> Health {
        let statuses = self.store.get_all_statuses().await;
        let failure_counts = self.failures.snapshot().await;

        let mut running_count = 0;
        let mut failed_jobs = Vec::new();
        for name in self.catalog.names() {
            match statuses.get(name).map(|status| status.state) {
                Some(JobState::Running) => running_count += 1,
                Some(JobState::Failed) => failed_jobs.push(name.to_string()),
                _ => {}
            }
        }

        let blocked_jobs: Vec<String> = failure_counts
            .iter()
            .filter(|(_, &count)| count >= self.settings.failure_threshold)
            .map(|(name, _)| name.clone())
            .collect();

        Health {
            healthy: blocked_jobs.is_empty(),
            running_count,
            failed_jobs,
            blocked_jobs,
            failure_counts,
            persistence: self.store.backend_kind(),
        }
    }

    /// Start the status poller and the detector.
    ///
    /// Both loops exit once `shutdown` changes or its sender is dropped.
    pub fn spawn_background(self: &Arc<Self>, shutdown: &watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let poller = Arc::clone(self);
        let poll_interval = self.settings.poll_interval;
        let detector = Arc::clone(self);
        let scan_interval = self.settings.scan_interval;

        vec![
            tokio::spawn(run_every(poll_interval, shutdown.clone(), move || {
                let poller = Arc::clone(&poller);
                async move {
                    poller.poll_once().await;
                }
            })),
            tokio::spawn(run_every(scan_interval, shutdown.clone(), move || {
                let detector = Arc::clone(&detector);
                async move {
                    detector.scan_zombies().await;
                    detector.enforce_timeouts().await;
                }
            })),
        ]
    }

    fn definition(&self, name: &str) -> Result<&JobDefinition, SupervisorError> {
        self.catalog
            .get(name)
            .ok_or_else(|| SupervisorError::unknown(name))
    }

    fn timeout_for(&self, definition: &JobDefinition) -> Duration {
        definition.timeout.unwrap_or(self.settings.default_timeout)
    }

    /// What a live process for `run` of `name` should look like.
    fn identity<'a>(&'a self, name: &'a str, run: ActiveRun) -> Identity<'a> {
        Identity {
            pattern: self
                .catalog
                .get(name)
                .map_or(name, |definition| definition.identity.as_str()),
            started_at: Some(run.start_time),
        }
    }
}

async fn run_every<F, Fut>(period: Duration, mut shutdown: watch::Receiver<bool>, mut tick: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => tick().await,
            _ = shutdown.changed() => break,
        }
    }
}
