//! Errors surfaced to callers of the supervisor.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The name is not in the job catalog.
    #[error("unknown job: {0}")]
    UnknownJob(String),

    /// The OS refused to start the worker.
    #[error("failed to start job {name}: {reason}")]
    Spawn { name: String, reason: String },
}

impl SupervisorError {
    pub fn unknown(name: &str) -> Self {
        Self::UnknownJob(name.to_string())
    }
}
