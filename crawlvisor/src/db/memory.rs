//! In-memory status backend.
//!
//! Used as the fallback when Postgres is unavailable and as the write-through
//! cache behind [`StatusStore`](super::StatusStore).

use std::collections::{HashMap, VecDeque};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use super::store::{BackendKind, StatusBackend, LOG_RETENTION};
use crate::models::{JobStatus, LogEntry};

#[derive(Debug, Default)]
pub struct MemoryBackend {
    statuses: Mutex<HashMap<String, JobStatus>>,
    logs: Mutex<HashMap<String, VecDeque<LogEntry>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatusBackend for MemoryBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    async fn get_status(&self, name: &str) -> Result<Option<JobStatus>> {
        Ok(self.statuses.lock().await.get(name).cloned())
    }

    async fn all_statuses(&self) -> Result<HashMap<String, JobStatus>> {
        Ok(self.statuses.lock().await.clone())
    }

    async fn put_status(&self, name: &str, status: &JobStatus) -> Result<()> {
        self.statuses
            .lock()
            .await
            .insert(name.to_string(), status.clone());
        Ok(())
    }

    async fn add_log(&self, entry: &LogEntry) -> Result<()> {
        let mut logs = self.logs.lock().await;
        let tail = logs.entry(entry.job_name.clone()).or_default();
        tail.push_back(entry.clone());
        while tail.len() > LOG_RETENTION {
            tail.pop_front();
        }
        Ok(())
    }

    async fn logs(&self, name: &str, limit: usize) -> Result<Vec<LogEntry>> {
        let logs = self.logs.lock().await;
        let Some(tail) = logs.get(name) else {
            return Ok(Vec::new());
        };
        let skip = tail.len().saturating_sub(limit);
        Ok(tail.iter().skip(skip).cloned().collect())
    }

    async fn has_rows(&self) -> Result<bool> {
        Ok(!self.statuses.lock().await.is_empty())
    }
}
