//! Results returned by supervisor control operations.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::job::{JobState, LogEntry};
use crate::db::BackendKind;

/// Result of a launch request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LaunchOutcome {
    /// A new worker process was spawned.
    Started { pid: u32 },
    /// A worker is already running; nothing was spawned.
    AlreadyRunning { pid: Option<u32> },
    /// The circuit breaker is open; retry with `force` or reset the counter.
    Blocked { failure_count: u32 },
}

/// How a stop request ended the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopMethod {
    /// Exited within the grace period after the termination signal.
    Graceful,
    /// Killed after ignoring the termination signal.
    Forced,
    /// Had already exited before any signal was sent.
    AlreadyExited,
    /// Only persisted state remained; no live process was found.
    StaleCleared,
}

/// Result of a stop request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StopOutcome {
    Stopped { method: StopMethod },
    NotRunning,
    /// Only produced by stop-all, when a single stop panicked or overran.
    Failed { error: String },
}

/// Result of a failure-counter reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ResetOutcome {
    Success,
    NotFound,
}

/// Per-job view returned by `GetStatus`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub state: JobState,
    pub last_run: Option<DateTime<Utc>>,
    pub pid: Option<u32>,
    pub start_time: Option<DateTime<Utc>>,
    pub failure_count: u32,
    pub logs: Vec<LogEntry>,
}

/// Aggregate supervisor health.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    /// True when no job is held back by the circuit breaker.
    pub healthy: bool,
    pub running_count: usize,
    pub failed_jobs: Vec<String>,
    pub blocked_jobs: Vec<String>,
    pub failure_counts: BTreeMap<String, u32>,
    pub persistence: BackendKind,
}
