//! Persisted job state and log entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Not running; the last run (if any) finished cleanly or was stopped.
    #[default]
    Idle,
    /// A worker process is (believed to be) running.
    Running,
    /// The last run exited non-zero, timed out, or was reaped.
    Failed,
}

impl JobState {
    /// Convert state to string for database storage.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Failed => "failed",
        }
    }

    /// Parse state from database string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(Self::Idle),
            "running" => Some(Self::Running),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// The OS-level identity of an in-flight run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveRun {
    pub pid: u32,
    pub start_time: DateTime<Utc>,
}

/// Persisted status of one job.
///
/// `run` is only ever present while `state` is [`JobState::Running`];
/// [`JobStatus::new`] enforces this.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobStatus {
    pub state: JobState,
    pub last_run: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub run: Option<ActiveRun>,
}

impl JobStatus {
    pub fn new(state: JobState, last_run: Option<DateTime<Utc>>, run: Option<ActiveRun>) -> Self {
        let run = if state == JobState::Running { run } else { None };
        Self {
            state,
            last_run,
            run,
        }
    }

    pub const fn running(run: ActiveRun, last_run: Option<DateTime<Utc>>) -> Self {
        Self {
            state: JobState::Running,
            last_run,
            run: Some(run),
        }
    }

    /// The active run, if this status claims the job is running.
    pub fn active_run(&self) -> Option<ActiveRun> {
        match self.state {
            JobState::Running => self.run,
            _ => None,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.run.map(|run| run.pid)
    }
}

/// One line of job output or supervisor commentary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub job_name: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(job_name: impl Into<String>, message: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            job_name: job_name.into(),
            message: message.into(),
            timestamp,
        }
    }
}
