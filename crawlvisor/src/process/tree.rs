//! Process tree signalling.
//!
//! Workers may fork helpers. Descendants are enumerated while the root is
//! still alive (once it exits they are reparented and can no longer be
//! found), then signalled deepest-first before the root.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};
use tokio::time::{sleep, Instant};

use super::probe;

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A root pid and the descendants observed under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessTree {
    pub root: u32,
    /// Deepest descendants first.
    pub descendants: Vec<u32>,
}

impl ProcessTree {
    /// Capture `root` and every current descendant.
    pub fn snapshot(root: u32) -> Self {
        Self {
            root,
            descendants: find_descendants(root),
        }
    }

    /// Add descendants spawned since the snapshot, keeping known ones.
    pub fn refresh(&mut self) {
        let known: HashSet<u32> = self.descendants.iter().copied().collect();
        let fresh: Vec<u32> = find_descendants(self.root)
            .into_iter()
            .filter(|pid| !known.contains(pid))
            .collect();
        if !fresh.is_empty() {
            let mut merged = fresh;
            merged.append(&mut self.descendants);
            self.descendants = merged;
        }
    }

    /// Deliver `signal` to every descendant and then to the root.
    pub fn signal(&self, signal: Signal) {
        for &pid in &self.descendants {
            if let Err(err) = send_signal(pid, signal) {
                tracing::debug!(pid, ?signal, %err, "failed to signal descendant");
            }
        }
        if let Err(err) = send_signal(self.root, signal) {
            tracing::warn!(pid = self.root, ?signal, %err, "failed to signal process");
        }
    }

    /// Members of the tree that are still running.
    pub fn survivors(&self) -> Vec<u32> {
        std::iter::once(self.root)
            .chain(self.descendants.iter().copied())
            .filter(|&pid| probe::pid_exists(pid) && !probe::is_zombie(pid))
            .collect()
    }

    /// Forcefully kill whatever is left of the tree.
    pub fn kill_survivors(&self) -> usize {
        let survivors = self.survivors();
        for &pid in &survivors {
            let _ = send_signal(pid, Signal::SIGKILL);
        }
        survivors.len()
    }
}

/// Send `signal` to `pid`, treating an already-gone process as success.
pub fn send_signal(pid: u32, signal: Signal) -> Result<(), Errno> {
    let raw = i32::try_from(pid).map_err(|_| Errno::EINVAL)?;
    // 0 and negative values address process groups, not processes
    if raw <= 0 {
        return Ok(());
    }
    match kill(Pid::from_raw(raw), signal) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(err) => Err(err),
    }
}

/// Poll until `pid` is gone (or defunct) or `limit` elapses.
///
/// For processes the supervisor holds no handle for; owned children are
/// awaited through their handle instead. Returns whether the process exited.
pub async fn wait_for_exit(pid: u32, limit: Duration) -> bool {
    let deadline = Instant::now() + limit;
    loop {
        if !probe::pid_exists(pid) || probe::is_zombie(pid) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(EXIT_POLL_INTERVAL).await;
    }
}

/// All descendants of `root`, deepest first.
fn find_descendants(root: u32) -> Vec<u32> {
    let mut system = System::new();
    system.refresh_processes_specifics(ProcessesToUpdate::All, true, ProcessRefreshKind::new());

    let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
    for (pid, process) in system.processes() {
        // Threads show up as tasks of their process; skip them
        if process.thread_kind().is_some() {
            continue;
        }
        if let Some(parent) = process.parent() {
            children.entry(parent.as_u32()).or_default().push(pid.as_u32());
        }
    }

    // Breadth-first walk, then reverse so the deepest come first
    let mut order = Vec::new();
    let mut seen = HashSet::from([root]);
    let mut queue = std::collections::VecDeque::from([root]);
    while let Some(pid) = queue.pop_front() {
        if let Some(kids) = children.get(&pid) {
            for &kid in kids {
                if seen.insert(kid) {
                    order.push(kid);
                    queue.push_back(kid);
                }
            }
        }
    }
    order.reverse();
    order
}
