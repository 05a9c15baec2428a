//! Liveness probing for pids the supervisor may or may not own.
//!
//! A pid alone is weak evidence: after a supervisor restart the persisted
//! pid may have been recycled by an unrelated process. [`is_alive`] therefore
//! checks existence, rejects zombies, and then requires the process to look
//! like the expected job, both by name/command line and by start time.

use chrono::{DateTime, TimeDelta, Utc};
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use sysinfo::{ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System, UpdateKind};

/// Slack between the recorded start time and the OS-reported one.
const START_TIME_TOLERANCE: TimeDelta = TimeDelta::seconds(5);

/// What the probe expects to find behind a pid.
#[derive(Debug, Clone, Copy)]
pub struct Identity<'a> {
    /// Substring of the process name or command line.
    pub pattern: &'a str,
    /// When the supervisor recorded the run as started.
    pub started_at: Option<DateTime<Utc>>,
}

/// OS view of a single process.
#[derive(Debug, Clone)]
pub struct ProcessSnapshot {
    pub pid: u32,
    pub name: String,
    pub cmdline: Vec<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub zombie: bool,
}

impl ProcessSnapshot {
    /// Whether the name or command line mentions `pattern`.
    ///
    /// An unreadable command line cannot rule the process out.
    pub fn matches(&self, pattern: &str) -> bool {
        if pattern.is_empty() || self.name.contains(pattern) {
            return true;
        }
        if self.cmdline.is_empty() {
            return true;
        }
        self.cmdline.iter().any(|arg| arg.contains(pattern))
    }

    /// Whether the process started after the run it is supposed to be.
    pub fn started_after(&self, recorded: DateTime<Utc>) -> bool {
        self.started_at
            .is_some_and(|actual| actual > recorded + START_TIME_TOLERANCE)
    }
}

/// Whether any process holds `pid`, zombies included.
pub fn pid_exists(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    // 0 and negative values address process groups, not processes
    if raw <= 0 {
        return false;
    }
    match kill(Pid::from_raw(raw), None) {
        Ok(()) | Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Read name, command line, start time and zombie state of `pid`.
pub fn inspect(pid: u32) -> Option<ProcessSnapshot> {
    let sys_pid = sysinfo::Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[sys_pid]),
        true,
        ProcessRefreshKind::new().with_cmd(UpdateKind::Always),
    );

    let process = system.process(sys_pid)?;
    let started_at = i64::try_from(process.start_time())
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0));

    Some(ProcessSnapshot {
        pid,
        name: process.name().to_string_lossy().into_owned(),
        cmdline: process
            .cmd()
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect(),
        started_at,
        zombie: matches!(process.status(), ProcessStatus::Zombie),
    })
}

/// Whether `pid` is defunct: exited but not yet reaped by its parent.
pub fn is_zombie(pid: u32) -> bool {
    inspect(pid).is_some_and(|snapshot| snapshot.zombie)
}

/// Whether `pid` is a live process that plausibly belongs to the job.
pub fn is_alive(pid: u32, identity: &Identity<'_>) -> bool {
    if !pid_exists(pid) {
        return false;
    }

    // Exists per signal 0 but hidden from the process table: trust the signal
    let Some(snapshot) = inspect(pid) else {
        return true;
    };

    if snapshot.zombie {
        tracing::debug!(pid, "process is defunct");
        return false;
    }

    if !snapshot.matches(identity.pattern) {
        tracing::debug!(
            pid,
            name = %snapshot.name,
            pattern = identity.pattern,
            "pid belongs to an unrelated process"
        );
        return false;
    }

    if let Some(recorded) = identity.started_at {
        if snapshot.started_after(recorded) {
            tracing::debug!(pid, %recorded, "pid was recycled after the run started");
            return false;
        }
    }

    true
}
