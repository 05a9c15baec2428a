//! Data models for crawlvisor.

mod definition;
mod job;
mod outcome;

pub use definition::{JobCatalog, JobDefinition};
pub use job::{ActiveRun, JobState, JobStatus, LogEntry};
pub use outcome::{Health, JobReport, LaunchOutcome, ResetOutcome, StopMethod, StopOutcome};
