//! Legacy flat-file status snapshot.
//!
//! Older deployments kept job state in a single JSON file keyed by job name:
//!
//! ```json
//! { "news": { "status": "idle", "last_run": "2024-05-01T10:00:00Z", "logs": ["..."] } }
//! ```
//!
//! The file is read once at startup and replayed into the active backend.
//! It is never modified or removed.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::store::{StatusBackend, LOG_RETENTION};
use crate::models::{JobState, JobStatus, LogEntry};

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum LegacyLog {
    Line(String),
    Entry {
        message: String,
        timestamp: Option<DateTime<Utc>>,
    },
}

#[derive(Debug, Clone, Deserialize)]
struct LegacyJob {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    last_run: Option<DateTime<Utc>>,
    #[serde(default)]
    logs: Vec<LegacyLog>,
}

/// Counts of what a migration replayed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub jobs: usize,
    pub logs: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct LegacySnapshot {
    jobs: BTreeMap<String, LegacyJob>,
}

impl LegacySnapshot {
    /// Load the snapshot at `path`, or `None` if there is no file.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let snapshot = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Some(snapshot))
    }

    pub fn job_names(&self) -> impl Iterator<Item = &str> {
        self.jobs.keys().map(String::as_str)
    }

    /// Replay every job status and its newest log lines into `backend`.
    pub async fn migrate_into(&self, backend: &dyn StatusBackend) -> Result<MigrationReport> {
        let loaded_at = Utc::now();
        let mut report = MigrationReport::default();

        for (name, job) in &self.jobs {
            let raw_state = job.status.as_deref().unwrap_or("idle");
            // A pid was never recorded, so an interrupted run cannot be tracked
            let (state, interrupted) = match JobState::from_str(raw_state) {
                Some(JobState::Running) => (JobState::Failed, true),
                Some(state) => (state, false),
                None => (JobState::Idle, false),
            };

            backend
                .put_status(name, &JobStatus::new(state, job.last_run, None))
                .await
                .with_context(|| format!("Failed to migrate status of {name}"))?;
            report.jobs += 1;

            let fallback_time = job.last_run.unwrap_or(loaded_at);
            let skip = job.logs.len().saturating_sub(LOG_RETENTION);
            for log in job.logs.iter().skip(skip) {
                let entry = match log {
                    LegacyLog::Line(message) => LogEntry::new(name, message, fallback_time),
                    LegacyLog::Entry { message, timestamp } => {
                        LogEntry::new(name, message, timestamp.unwrap_or(fallback_time))
                    }
                };
                backend
                    .add_log(&entry)
                    .await
                    .with_context(|| format!("Failed to migrate logs of {name}"))?;
                report.logs += 1;
            }

            if interrupted {
                backend
                    .add_log(&LogEntry::new(
                        name,
                        "run interrupted before migration, marked failed",
                        loaded_at,
                    ))
                    .await?;
            }
        }

        Ok(report)
    }
}
