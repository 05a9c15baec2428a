//! Status store facade.
//!
//! [`StatusStore`] fronts an optional durable backend with an in-memory
//! cache. Every write lands in the cache and is attempted against the durable
//! backend; reads prefer the durable backend and fall back to the cache. A
//! failing backend is logged and never surfaces to the caller, so job
//! supervision keeps going with non-durable state.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::legacy::LegacySnapshot;
use super::memory::MemoryBackend;
use super::postgres::PostgresBackend;
use crate::models::{ActiveRun, JobState, JobStatus, LogEntry};

/// Log lines kept per job.
pub const LOG_RETENTION: usize = 100;

/// Which implementation is serving reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Postgres,
    Memory,
}

/// Storage for job statuses and their bounded log tails.
#[async_trait]
pub trait StatusBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    async fn get_status(&self, name: &str) -> Result<Option<JobStatus>>;

    async fn all_statuses(&self) -> Result<HashMap<String, JobStatus>>;

    async fn put_status(&self, name: &str, status: &JobStatus) -> Result<()>;

    /// Append a log line, pruning the job's tail to [`LOG_RETENTION`] in the
    /// same operation.
    async fn add_log(&self, entry: &LogEntry) -> Result<()>;

    /// The newest `limit` lines for `name`, oldest first.
    async fn logs(&self, name: &str, limit: usize) -> Result<Vec<LogEntry>>;

    /// Whether any job status has ever been stored.
    async fn has_rows(&self) -> Result<bool>;
}

/// Where [`StatusStore::open`] looks for state.
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    pub database_url: Option<String>,
    pub legacy_snapshot: Option<PathBuf>,
    pub connect_timeout: Duration,
}

pub struct StatusStore {
    durable: Option<Arc<dyn StatusBackend>>,
    cache: MemoryBackend,
}

impl std::fmt::Debug for StatusStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusStore")
            .field("durable", &self.durable.as_ref().map(|backend| backend.kind()))
            .finish_non_exhaustive()
    }
}

impl StatusStore {
    /// A store with no durable backend.
    pub fn in_memory() -> Self {
        Self {
            durable: None,
            cache: MemoryBackend::new(),
        }
    }

    /// A store writing through to `backend`.
    pub fn with_backend(backend: Arc<dyn StatusBackend>) -> Self {
        Self {
            durable: Some(backend),
            cache: MemoryBackend::new(),
        }
    }

    /// Open the configured store, migrating or seeding from the legacy
    /// snapshot as needed.
    ///
    /// Never fails: an unreachable database yields an in-memory store.
    pub async fn open(options: &StoreOptions) -> Self {
        let snapshot = match options.legacy_snapshot.as_deref() {
            Some(path) => match LegacySnapshot::load(path) {
                Ok(Some(snapshot)) => {
                    let jobs: Vec<&str> = snapshot.job_names().collect();
                    tracing::info!(path = %path.display(), ?jobs, "found legacy status snapshot");
                    Some(snapshot)
                }
                Ok(None) => None,
                Err(err) => {
                    tracing::warn!(path = %path.display(), "ignoring unreadable legacy snapshot: {err:#}");
                    None
                }
            },
            None => None,
        };

        let durable = match options.database_url.as_deref() {
            Some(url) => match PostgresBackend::connect(url, options.connect_timeout).await {
                Ok(backend) => Some(backend),
                Err(err) => {
                    tracing::warn!("durable status store unavailable, using in-memory fallback: {err:#}");
                    None
                }
            },
            None => {
                tracing::info!("no DATABASE_URL configured, job state is not durable");
                None
            }
        };

        match durable {
            Some(backend) => {
                if let Some(snapshot) = snapshot {
                    match backend.has_rows().await {
                        Ok(false) => match snapshot.migrate_into(&backend).await {
                            Ok(report) => tracing::info!(
                                jobs = report.jobs,
                                logs = report.logs,
                                "migrated legacy status snapshot into database"
                            ),
                            Err(err) => tracing::warn!("legacy snapshot migration failed: {err:#}"),
                        },
                        Ok(true) => tracing::debug!("database already populated, legacy snapshot skipped"),
                        Err(err) => tracing::warn!("could not check database before migration: {err:#}"),
                    }
                }
                Self::with_backend(Arc::new(backend))
            }
            None => {
                let store = Self::in_memory();
                if let Some(snapshot) = snapshot {
                    if let Err(err) = snapshot.migrate_into(&store.cache).await {
                        tracing::warn!("failed to seed in-memory store from legacy snapshot: {err:#}");
                    }
                }
                store
            }
        }
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.durable
            .as_ref()
            .map_or(BackendKind::Memory, |backend| backend.kind())
    }

    /// Status of `name`, materializing an idle default for unseen jobs.
    pub async fn get_status(&self, name: &str) -> JobStatus {
        let found = match self.durable.as_deref() {
            Some(backend) => match backend.get_status(name).await {
                Ok(found) => found,
                Err(err) => {
                    tracing::warn!(job = name, "status read degraded to memory: {err:#}");
                    self.cached_status(name).await
                }
            },
            None => self.cached_status(name).await,
        };

        if let Some(status) = found {
            return status;
        }

        let status = JobStatus::default();
        self.put(name, &status).await;
        status
    }

    pub async fn get_all_statuses(&self) -> HashMap<String, JobStatus> {
        if let Some(backend) = self.durable.as_deref() {
            match backend.all_statuses().await {
                Ok(statuses) => return statuses,
                Err(err) => tracing::warn!("status listing degraded to memory: {err:#}"),
            }
        }
        self.cache.all_statuses().await.unwrap_or_default()
    }

    /// Record a state transition.
    ///
    /// `last_run` of `None` keeps the previously recorded value. `run` is
    /// dropped unless `state` is [`JobState::Running`].
    pub async fn update_status(
        &self,
        name: &str,
        state: JobState,
        last_run: Option<DateTime<Utc>>,
        run: Option<ActiveRun>,
    ) {
        let last_run = match last_run {
            Some(at) => Some(at),
            None => self.get_status(name).await.last_run,
        };
        self.put(name, &JobStatus::new(state, last_run, run)).await;
    }

    pub async fn add_log(&self, name: &str, message: impl Into<String>, timestamp: DateTime<Utc>) {
        let entry = LogEntry::new(name, message, timestamp);
        let _ = self.cache.add_log(&entry).await;
        if let Some(backend) = self.durable.as_deref() {
            if let Err(err) = backend.add_log(&entry).await {
                tracing::warn!(job = name, "log write degraded to memory: {err:#}");
            }
        }
    }

    pub async fn get_logs(&self, name: &str, limit: usize) -> Vec<LogEntry> {
        if let Some(backend) = self.durable.as_deref() {
            match backend.logs(name, limit).await {
                Ok(logs) => return logs,
                Err(err) => tracing::warn!(job = name, "log read degraded to memory: {err:#}"),
            }
        }
        self.cache.logs(name, limit).await.unwrap_or_default()
    }

    async fn cached_status(&self, name: &str) -> Option<JobStatus> {
        self.cache.get_status(name).await.ok().flatten()
    }

    async fn put(&self, name: &str, status: &JobStatus) {
        let _ = self.cache.put_status(name, status).await;
        if let Some(backend) = self.durable.as_deref() {
            if let Err(err) = backend.put_status(name, status).await {
                tracing::warn!(job = name, state = %status.state, "status write degraded to memory: {err:#}");
            }
        }
    }
}
