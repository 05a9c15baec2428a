//! Caller-facing launch and stop operations.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use nix::sys::signal::Signal;
use tokio::process::Child;
use tokio::task::JoinSet;
use tokio::time::Instant;

use super::poller::collect_output;
use super::{Supervisor, TrackedProcess};
use crate::error::SupervisorError;
use crate::models::{ActiveRun, JobState, LaunchOutcome, StopMethod, StopOutcome};
use crate::process::{self, probe, tree, ProcessTree, SpawnedProcess};

/// Extra time a single stop gets during stop-all before it is abandoned.
const STOP_ALL_SLACK: Duration = Duration::from_secs(1);

/// The root of a process tree being stopped.
pub(super) enum Root<'a> {
    /// A child this supervisor spawned and can wait on directly.
    Owned { child: &'a mut Child, pid: u32 },
    /// A process left behind by an earlier supervisor instance.
    Detached(u32),
}

impl Root<'_> {
    const fn pid(&self) -> u32 {
        match self {
            Self::Owned { pid, .. } => *pid,
            Self::Detached(pid) => *pid,
        }
    }

    fn has_exited(&mut self) -> bool {
        match self {
            Self::Owned { child, .. } => matches!(child.try_wait(), Ok(Some(_))),
            Self::Detached(pid) => !probe::pid_exists(*pid) || probe::is_zombie(*pid),
        }
    }

    async fn wait(&mut self, limit: Duration) -> bool {
        match self {
            Self::Owned { child, .. } => tokio::time::timeout(limit, child.wait()).await.is_ok(),
            Self::Detached(pid) => tree::wait_for_exit(*pid, limit).await,
        }
    }
}

impl Supervisor {
    /// Start `name` unless it is already running or blocked by the circuit
    /// breaker. `force` bypasses the breaker.
    pub async fn launch(&self, name: &str, force: bool) -> Result<LaunchOutcome, SupervisorError> {
        let definition = self.definition(name)?;
        let _guard = self.locks.acquire(name).await;

        if let Some(pid) = self.registry.pid_of(name).await {
            return Ok(LaunchOutcome::AlreadyRunning { pid: Some(pid) });
        }

        // Persisted as running by an earlier supervisor instance
        if let Some(run) = self.store.get_status(name).await.active_run() {
            if probe::is_alive(run.pid, &self.identity(name, run)) {
                tracing::info!(job = name, pid = run.pid, "job already running outside this supervisor");
                return Ok(LaunchOutcome::AlreadyRunning { pid: Some(run.pid) });
            }
            self.store.update_status(name, JobState::Idle, None, None).await;
            self.store
                .add_log(
                    name,
                    format!("cleared stale running state (pid {} is gone)", run.pid),
                    Utc::now(),
                )
                .await;
            tracing::info!(job = name, pid = run.pid, "cleared stale running state");
        }

        let failure_count = self.failures.get(name).await;
        if failure_count >= self.settings.failure_threshold {
            if !force {
                tracing::warn!(job = name, failure_count, "launch blocked by circuit breaker");
                return Ok(LaunchOutcome::Blocked { failure_count });
            }
            tracing::warn!(job = name, failure_count, "forcing launch past circuit breaker");
        }

        let timeout = self.timeout_for(definition);
        let SpawnedProcess { child, pid, output } =
            match process::spawn(&definition.process_options(timeout)) {
                Ok(spawned) => spawned,
                Err(err) => {
                    let reason = format!("{err:#}");
                    let now = Utc::now();
                    let failure_count = self.failures.increment(name).await;
                    self.store.update_status(name, JobState::Failed, Some(now), None).await;
                    self.store.add_log(name, format!("failed to start: {reason}"), now).await;
                    tracing::error!(job = name, failure_count, "failed to start: {reason}");
                    return Err(SupervisorError::Spawn {
                        name: name.to_string(),
                        reason,
                    });
                }
            };

        let start_time = Utc::now();
        self.store
            .update_status(name, JobState::Running, None, Some(ActiveRun { pid, start_time }))
            .await;
        self.store
            .add_log(
                name,
                format!("started (pid {pid}, timeout {}s)", timeout.as_secs()),
                start_time,
            )
            .await;

        let mut tracked = TrackedProcess::new(child, pid, start_time);
        if let Some(output) = output {
            let collector = collect_output(Arc::clone(&self.store), name.to_string(), output);
            tracked = tracked.with_collector(collector);
        }
        self.registry.insert(name, tracked).await;
        tracing::info!(job = name, pid, timeout_secs = timeout.as_secs(), "job started");

        Ok(LaunchOutcome::Started { pid })
    }

    /// Stop `name`, escalating from SIGTERM to SIGKILL after the grace
    /// period. Stopping a job that is not running is a no-op.
    pub async fn stop(&self, name: &str) -> Result<StopOutcome, SupervisorError> {
        self.definition(name)?;
        let _guard = self.locks.acquire(name).await;

        if let Some(mut tracked) = self.registry.remove(name).await {
            let root = Root::Owned {
                child: &mut tracked.child,
                pid: tracked.pid,
            };
            let method = self.escalate(root, self.settings.grace_period).await;
            self.finish_stop(name, method).await;
            return Ok(StopOutcome::Stopped { method });
        }

        let Some(run) = self.store.get_status(name).await.active_run() else {
            return Ok(StopOutcome::NotRunning);
        };

        let method = if probe::is_alive(run.pid, &self.identity(name, run)) {
            self.escalate(Root::Detached(run.pid), self.settings.grace_period)
                .await
        } else {
            StopMethod::StaleCleared
        };
        self.finish_stop(name, method).await;
        Ok(StopOutcome::Stopped { method })
    }

    /// Stop every registered job concurrently.
    ///
    /// Each stop runs as its own task and the wait for it is capped, so the
    /// whole call is bounded even when workers ignore signals. A stop that
    /// overruns is reported as failed but keeps running until it has saved
    /// the job's state. One failed stop never prevents the others.
    pub async fn stop_all(self: &Arc<Self>) -> BTreeMap<String, StopOutcome> {
        let cap = self.settings.stop_budget() + STOP_ALL_SLACK;
        let mut tasks = JoinSet::new();

        for name in self.registry.names().await {
            let supervisor = Arc::clone(self);
            tasks.spawn(async move {
                let job = name.clone();
                let mut stop = tokio::spawn(async move { supervisor.stop(&job).await });
                let outcome = match tokio::time::timeout(cap, &mut stop).await {
                    Ok(Ok(Ok(outcome))) => outcome,
                    Ok(Ok(Err(err))) => StopOutcome::Failed {
                        error: err.to_string(),
                    },
                    Ok(Err(err)) => StopOutcome::Failed {
                        error: format!("stop task failed: {err}"),
                    },
                    Err(_) => StopOutcome::Failed {
                        error: format!(
                            "stop did not finish within {}s, still running",
                            cap.as_secs_f64()
                        ),
                    },
                };
                (name, outcome)
            });
        }

        let mut results = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, outcome)) => {
                    if let StopOutcome::Failed { error } = &outcome {
                        tracing::error!(job = %name, "stop failed during stop-all: {error}");
                    }
                    results.insert(name, outcome);
                }
                Err(err) => tracing::error!("stop task aborted: {err}"),
            }
        }

        tracing::info!(stopped = results.len(), "stop-all finished");
        results
    }

    /// Terminate a process tree: SIGTERM everything, wait up to `grace`
    /// for the root, then SIGKILL whatever is left.
    pub(super) async fn escalate(&self, mut root: Root<'_>, grace: Duration) -> StopMethod {
        if root.has_exited() {
            return StopMethod::AlreadyExited;
        }

        let pid = root.pid();
        let mut tree = ProcessTree::snapshot(pid);
        let deadline = Instant::now() + grace;
        tree.signal(Signal::SIGTERM);

        if root.wait(grace).await {
            for &descendant in &tree.descendants {
                let left = deadline.saturating_duration_since(Instant::now());
                tree::wait_for_exit(descendant, left).await;
            }
            let killed = tree.kill_survivors();
            if killed > 0 {
                tracing::debug!(pid, killed, "killed descendants that outlived their parent");
            }
            return StopMethod::Graceful;
        }

        tracing::warn!(pid, grace_ms = grace.as_millis(), "process ignored SIGTERM, killing");
        tree.refresh();
        tree.signal(Signal::SIGKILL);
        if !root.wait(self.settings.kill_wait).await {
            tracing::error!(pid, "process still present after SIGKILL");
        }
        tree.kill_survivors();
        StopMethod::Forced
    }

    async fn finish_stop(&self, name: &str, method: StopMethod) {
        let now = Utc::now();
        self.store.update_status(name, JobState::Idle, Some(now), None).await;

        let message = match method {
            StopMethod::Graceful => "stopped gracefully",
            StopMethod::Forced => "force killed after grace period",
            StopMethod::AlreadyExited => "stopped (process had already exited)",
            StopMethod::StaleCleared => "cleared stale running state",
        };
        self.store.add_log(name, message, now).await;
        tracing::info!(job = name, ?method, "job stopped");
    }
}
