//! Exit detection for registered workers and output collection.

use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;

use super::{Supervisor, TrackedProcess};
use crate::db::StatusStore;
use crate::models::JobState;
use crate::process::{probe, OutputStream};

/// How a registered worker finished.
#[derive(Debug)]
pub(super) enum Completion {
    Exited(ExitStatus),
    /// The OS reports the process as defunct but it has not been reaped.
    Defunct,
    /// Its status could not be read.
    ProbeError(String),
}

impl Supervisor {
    /// Check every registered worker once and record those that finished.
    ///
    /// Jobs whose lock is held by a control call are left for the next pass.
    pub(super) async fn poll_once(&self) -> usize {
        let mut finished = 0;
        for name in self.registry.names().await {
            let Some(_guard) = self.locks.try_acquire(&name).await else {
                continue;
            };
            if let Some((tracked, completion)) = self.take_finished(&name).await {
                self.complete(&name, tracked, completion).await;
                finished += 1;
            }
        }
        finished
    }

    async fn take_finished(&self, name: &str) -> Option<(TrackedProcess, Completion)> {
        let mut entries = self.registry.lock().await;
        let tracked = entries.get_mut(name)?;
        let completion = match tracked.child.try_wait() {
            Ok(Some(status)) => Completion::Exited(status),
            Ok(None) if probe::is_zombie(tracked.pid) => Completion::Defunct,
            Ok(None) => return None,
            Err(err) => Completion::ProbeError(err.to_string()),
        };
        entries.remove(name).map(|tracked| (tracked, completion))
    }

    /// Record how a worker ended. Its registry entry is already removed.
    ///
    /// The output collector is drained first, so the worker's last lines
    /// precede the completion entry in the log tail.
    pub(super) async fn complete(&self, name: &str, mut tracked: TrackedProcess, completion: Completion) {
        let failure = match completion {
            Completion::Exited(status) if status.success() => None,
            Completion::Exited(status) => Some(describe_exit(status)),
            Completion::Defunct => {
                let message = match tokio::time::timeout(self.settings.reap_wait, tracked.child.wait()).await {
                    Ok(Ok(status)) => format!("defunct process reaped, {}", describe_exit(status)),
                    Ok(Err(err)) => format!("defunct process could not be reaped: {err}"),
                    Err(_) => {
                        let _ = tracked.child.start_kill();
                        let _ = tokio::time::timeout(self.settings.kill_wait, tracked.child.wait()).await;
                        "defunct process did not reap in time, killed".to_string()
                    }
                };
                Some(message)
            }
            Completion::ProbeError(err) => {
                tracing::error!(job = name, pid = tracked.pid, "status check failed: {err}");
                let _ = tracked.child.start_kill();
                Some(format!("status check failed: {err}"))
            }
        };

        self.drain_output(name, &mut tracked).await;
        match failure {
            None => self.record_success(name).await,
            Some(message) => {
                self.record_failure(name, message).await;
            }
        }
    }

    /// Wait a bounded time for the collector to forward what is left.
    /// A descendant still holding the pipes leaves it running.
    async fn drain_output(&self, name: &str, tracked: &mut TrackedProcess) {
        let Some(mut collector) = tracked.collector.take() else {
            return;
        };
        if tokio::time::timeout(self.settings.reap_wait, &mut collector).await.is_err() {
            tracing::debug!(job = name, pid = tracked.pid, "output still open after exit, collector left running");
        }
    }

    async fn record_success(&self, name: &str) {
        let now = Utc::now();
        self.failures.reset(name).await;
        self.store.update_status(name, JobState::Idle, Some(now), None).await;
        self.store.add_log(name, "completed successfully", now).await;
        tracing::info!(job = name, "job completed successfully");
    }

    /// Mark `name` failed, log `message` and bump its failure count.
    pub(super) async fn record_failure(&self, name: &str, message: String) -> u32 {
        let now = Utc::now();
        let failure_count = self.failures.increment(name).await;
        self.store.update_status(name, JobState::Failed, Some(now), None).await;
        tracing::warn!(job = name, failure_count, "{message}");
        self.store.add_log(name, message, now).await;

        if failure_count >= self.settings.failure_threshold {
            tracing::warn!(
                job = name,
                failure_count,
                "failure threshold reached, launches blocked until reset"
            );
            self.store
                .add_log(
                    name,
                    format!("{failure_count} consecutive failures, launches blocked until reset"),
                    now,
                )
                .await;
        }
        failure_count
    }
}

fn describe_exit(status: ExitStatus) -> String {
    if let Some(code) = status.code() {
        format!("failed with exit code {code}")
    } else if let Some(signal) = status.signal() {
        format!("terminated by signal {signal}")
    } else {
        "failed".to_string()
    }
}

/// Forward each non-empty output line of `name` to the store until the
/// stream closes.
pub(super) fn collect_output(store: Arc<StatusStore>, name: String, mut output: OutputStream) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut forwarded = 0usize;
        while let Some(line) = output.next().await {
            match line {
                Ok(line) => {
                    let line = line.trim_end();
                    if line.trim_start().is_empty() {
                        continue;
                    }
                    store.add_log(&name, line, Utc::now()).await;
                    forwarded += 1;
                }
                Err(err) => {
                    tracing::warn!(job = %name, "output stream failed: {err}");
                    break;
                }
            }
        }
        tracing::debug!(job = %name, lines = forwarded, "output stream closed");
    })
}
