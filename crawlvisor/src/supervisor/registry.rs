//! In-memory table of processes this supervisor instance owns, plus the
//! per-job locks that serialize everything touching one job.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::process::Child;
use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// A worker spawned and owned by this supervisor.
#[derive(Debug)]
pub struct TrackedProcess {
    pub child: Child,
    pub pid: u32,
    /// Wall-clock start, as persisted.
    pub start_time: DateTime<Utc>,
    /// Monotonic start, for timeout accounting.
    pub started: Instant,
    /// The task forwarding this worker's output to the log tail.
    pub collector: Option<JoinHandle<()>>,
}

impl TrackedProcess {
    pub fn new(child: Child, pid: u32, start_time: DateTime<Utc>) -> Self {
        Self {
            child,
            pid,
            start_time,
            started: Instant::now(),
            collector: None,
        }
    }

    #[must_use]
    pub fn with_collector(mut self, collector: JoinHandle<()>) -> Self {
        self.collector = Some(collector);
        self
    }
}

/// Job name to owned process. Not persisted.
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    entries: Mutex<HashMap<String, TrackedProcess>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.entries.lock().await.contains_key(name)
    }

    pub async fn pid_of(&self, name: &str) -> Option<u32> {
        self.entries.lock().await.get(name).map(|tracked| tracked.pid)
    }

    /// Register `process` under `name`.
    ///
    /// Callers hold the job lock and have checked the name is free; a
    /// displaced entry would mean two live workers for one job.
    pub async fn insert(&self, name: &str, process: TrackedProcess) {
        let displaced = self.entries.lock().await.insert(name.to_string(), process);
        if let Some(old) = displaced {
            tracing::error!(job = name, pid = old.pid, "registry entry displaced, process is no longer tracked");
        }
    }

    pub async fn remove(&self, name: &str) -> Option<TrackedProcess> {
        self.entries.lock().await.remove(name)
    }

    /// Remove `name` only if its current entry has run longer than `limit`.
    ///
    /// The check and the removal happen under one lock, so an entry that
    /// replaced an overdue one in the meantime is judged on its own start.
    pub async fn remove_if_overdue(&self, name: &str, limit: Duration) -> Option<TrackedProcess> {
        let mut entries = self.entries.lock().await;
        if entries.get(name)?.started.elapsed() <= limit {
            return None;
        }
        entries.remove(name)
    }

    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// How long each registered process has been running.
    pub async fn elapsed(&self) -> Vec<(String, Duration)> {
        self.entries
            .lock()
            .await
            .iter()
            .map(|(name, tracked)| (name.clone(), tracked.started.elapsed()))
            .collect()
    }

    pub(super) async fn lock(&self) -> MutexGuard<'_, HashMap<String, TrackedProcess>> {
        self.entries.lock().await
    }
}

/// One mutex per job name.
#[derive(Debug, Default)]
pub struct JobLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl JobLocks {
    pub fn new() -> Self {
        Self::default()
    }

    async fn handle(&self, name: &str) -> Arc<Mutex<()>> {
        Arc::clone(
            self.locks
                .lock()
                .await
                .entry(name.to_string())
                .or_default(),
        )
    }

    /// Wait for exclusive access to `name`.
    pub async fn acquire(&self, name: &str) -> OwnedMutexGuard<()> {
        self.handle(name).await.lock_owned().await
    }

    /// Exclusive access to `name` if nobody else holds it.
    pub async fn try_acquire(&self, name: &str) -> Option<OwnedMutexGuard<()>> {
        self.handle(name).await.try_lock_owned().ok()
    }
}
