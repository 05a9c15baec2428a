//! Zombie reaping and timeout enforcement.

use chrono::Utc;

use super::control::Root;
use super::poller::Completion;
use super::Supervisor;
use crate::models::{ActiveRun, JobState};
use crate::process::probe;

impl Supervisor {
    /// Reap every persisted run whose process is gone.
    ///
    /// Runs once, before the supervisor accepts calls, so nothing holds a
    /// job lock yet. Live processes from an earlier instance are left alone.
    pub(super) async fn startup_scan(&self) -> usize {
        let mut statuses: Vec<_> = self.store.get_all_statuses().await.into_iter().collect();
        statuses.sort_by(|a, b| a.0.cmp(&b.0));

        let mut reaped = 0;
        for (name, status) in statuses {
            let Some(run) = status.active_run() else {
                continue;
            };
            let _guard = self.locks.acquire(&name).await;

            if probe::is_alive(run.pid, &self.identity(&name, run)) {
                tracing::info!(job = %name, pid = run.pid, "job still running from a previous supervisor");
                self.store
                    .add_log(
                        &name,
                        format!("process {} still running after supervisor restart", run.pid),
                        Utc::now(),
                    )
                    .await;
                continue;
            }

            self.reap(
                &name,
                run,
                format!("stale process reaped on startup (pid {})", run.pid),
            )
            .await;
            reaped += 1;
        }
        reaped
    }

    /// Reap persisted runs this instance does not own and whose process
    /// has died since startup.
    pub(super) async fn scan_zombies(&self) -> usize {
        let mut reaped = 0;
        for (name, status) in self.store.get_all_statuses().await {
            if status.active_run().is_none() || self.registry.contains(&name).await {
                continue;
            }
            let Some(_guard) = self.locks.try_acquire(&name).await else {
                continue;
            };

            // A launch may have finished between the listing and the lock
            if self.registry.contains(&name).await {
                continue;
            }
            let Some(run) = self.store.get_status(&name).await.active_run() else {
                continue;
            };
            if probe::is_alive(run.pid, &self.identity(&name, run)) {
                continue;
            }

            self.reap(
                &name,
                run,
                format!("stale process reaped (pid {} no longer alive)", run.pid),
            )
            .await;
            reaped += 1;
        }
        reaped
    }

    /// Force-stop registered workers that outlived their timeout.
    ///
    /// The elapsed listing only picks candidates. Each one is re-judged
    /// under its job lock, since a run may have been replaced while an
    /// earlier candidate was being stopped.
    pub(super) async fn enforce_timeouts(&self) -> usize {
        let mut stopped = 0;
        for (name, elapsed) in self.registry.elapsed().await {
            let Some(definition) = self.catalog.get(&name) else {
                continue;
            };
            let limit = self.timeout_for(definition);
            if elapsed <= limit {
                continue;
            }
            let Some(_guard) = self.locks.try_acquire(&name).await else {
                continue;
            };
            let Some(mut tracked) = self.registry.remove_if_overdue(&name, limit).await else {
                tracing::debug!(job = %name, "no overdue run left after locking, skipping");
                continue;
            };

            // Finished on its own since the last poll
            if let Ok(Some(status)) = tracked.child.try_wait() {
                self.complete(&name, tracked, Completion::Exited(status)).await;
                continue;
            }

            tracing::warn!(
                job = %name,
                pid = tracked.pid,
                elapsed_secs = tracked.started.elapsed().as_secs(),
                "timeout exceeded, stopping"
            );
            let root = Root::Owned {
                child: &mut tracked.child,
                pid: tracked.pid,
            };
            let method = self.escalate(root, self.settings.timeout_grace).await;
            tracing::debug!(job = %name, ?method, "timed out job stopped");

            self.record_failure(
                &name,
                format!(
                    "timeout exceeded after {}s, force stopped",
                    limit.as_secs_f64()
                ),
            )
            .await;
            stopped += 1;
        }
        stopped
    }

    /// Mark a dead persisted run failed. The previous `last_run` is kept.
    async fn reap(&self, name: &str, run: ActiveRun, message: String) {
        self.store.update_status(name, JobState::Failed, None, None).await;
        tracing::warn!(job = name, pid = run.pid, "{message}");
        self.store.add_log(name, message, Utc::now()).await;
    }
}
