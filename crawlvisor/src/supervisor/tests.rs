use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{sleep, Instant};

use super::poller::Completion;
use super::*;
use crate::db::{BackendKind, MemoryBackend, StatusBackend};
use crate::models::{JobStatus, LaunchOutcome, LogEntry, StopMethod, StopOutcome};
use crate::process::probe;

fn settings() -> SupervisorSettings {
    SupervisorSettings {
        poll_interval: Duration::from_millis(50),
        scan_interval: Duration::from_millis(100),
        grace_period: Duration::from_millis(500),
        timeout_grace: Duration::from_millis(300),
        kill_wait: Duration::from_secs(2),
        reap_wait: Duration::from_secs(1),
        default_timeout: Duration::from_secs(60),
        failure_threshold: 3,
    }
}

// Scripts end with a second command so `sh` stays the root process and
// keeps the job name in its command line.
fn catalog() -> JobCatalog {
    JobCatalog::new(vec![
        JobDefinition::shell("sleeper", "sleep 30; exit 0"),
        JobDefinition::shell("quick", "echo crawling; echo done"),
        JobDefinition::shell("broken", "echo boom >&2; exit 3"),
        JobDefinition::shell("stubborn", "trap '' TERM; while true; do sleep 0.2; done"),
        JobDefinition::shell("slow", "sleep 30; exit 0").timeout(Duration::from_millis(300)),
        JobDefinition::shell("hung", "trap '' TERM; while true; do sleep 0.2; done")
            .timeout(Duration::from_millis(200)),
        JobDefinition::shell("paced", "sleep 30; exit 0").timeout(Duration::from_secs(1)),
        JobDefinition::new("missing", "/nonexistent/crawl-worker-binary"),
    ])
}

async fn supervisor() -> Arc<Supervisor> {
    Supervisor::start(settings(), catalog(), StatusStore::in_memory()).await
}

/// Durable backend whose status writes can be slowed down.
struct SlowWrites {
    inner: MemoryBackend,
    delay_ms: AtomicU64,
}

impl SlowWrites {
    fn new() -> Self {
        Self {
            inner: MemoryBackend::new(),
            delay_ms: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl StatusBackend for SlowWrites {
    fn kind(&self) -> BackendKind {
        BackendKind::Postgres
    }

    async fn get_status(&self, name: &str) -> anyhow::Result<Option<JobStatus>> {
        self.inner.get_status(name).await
    }

    async fn all_statuses(&self) -> anyhow::Result<HashMap<String, JobStatus>> {
        self.inner.all_statuses().await
    }

    async fn put_status(&self, name: &str, status: &JobStatus) -> anyhow::Result<()> {
        sleep(Duration::from_millis(self.delay_ms.load(Ordering::SeqCst))).await;
        self.inner.put_status(name, status).await
    }

    async fn add_log(&self, entry: &LogEntry) -> anyhow::Result<()> {
        self.inner.add_log(entry).await
    }

    async fn logs(&self, name: &str, limit: usize) -> anyhow::Result<Vec<LogEntry>> {
        self.inner.logs(name, limit).await
    }

    async fn has_rows(&self) -> anyhow::Result<bool> {
        self.inner.has_rows().await
    }
}

fn dead_pid() -> u32 {
    let mut child = std::process::Command::new("true").spawn().unwrap();
    let pid = child.id();
    child.wait().unwrap();
    pid
}

/// Poll until `name` leaves the registry.
async fn wait_until_finished(supervisor: &Supervisor, name: &str) {
    for _ in 0..250 {
        supervisor.poll_once().await;
        if !supervisor.registry.contains(name).await {
            return;
        }
        sleep(Duration::from_millis(20)).await;
    }
    panic!("{name} did not finish");
}

async fn wait_for_log(supervisor: &Supervisor, name: &str, needle: &str) {
    for _ in 0..250 {
        if has_log(supervisor, name, needle).await {
            return;
        }
        sleep(Duration::from_millis(20)).await;
    }
    panic!("{name} never logged {needle:?}");
}

async fn has_log(supervisor: &Supervisor, name: &str, needle: &str) -> bool {
    supervisor
        .store()
        .get_logs(name, 100)
        .await
        .iter()
        .any(|entry| entry.message.contains(needle))
}

fn started_pid(outcome: &LaunchOutcome) -> u32 {
    match outcome {
        LaunchOutcome::Started { pid } => *pid,
        other => panic!("expected a start, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unknown_job_is_rejected() {
    let supervisor = supervisor().await;

    assert!(matches!(
        supervisor.launch("nope", false).await,
        Err(SupervisorError::UnknownJob(name)) if name == "nope"
    ));
    assert!(matches!(
        supervisor.stop("nope").await,
        Err(SupervisorError::UnknownJob(_))
    ));
    assert!(supervisor.logs("nope", 10).await.is_err());
    assert_eq!(supervisor.reset_failure_count("nope").await, ResetOutcome::NotFound);
}

#[tokio::test]
async fn test_concurrent_launches_spawn_once() {
    let supervisor = supervisor().await;

    let (first, second) = tokio::join!(
        supervisor.launch("sleeper", false),
        supervisor.launch("sleeper", false)
    );
    let outcomes = [first.unwrap(), second.unwrap()];

    let started: Vec<u32> = outcomes
        .iter()
        .filter_map(|outcome| match outcome {
            LaunchOutcome::Started { pid } => Some(*pid),
            _ => None,
        })
        .collect();
    assert_eq!(started.len(), 1);
    assert!(outcomes.contains(&LaunchOutcome::AlreadyRunning {
        pid: Some(started[0])
    }));
    assert_eq!(supervisor.registry.len().await, 1);

    let status = supervisor.store().get_status("sleeper").await;
    assert_eq!(status.state, JobState::Running);
    assert_eq!(status.pid(), Some(started[0]));

    supervisor.stop("sleeper").await.unwrap();
}

#[tokio::test]
async fn test_successful_run_returns_to_idle() {
    let supervisor = supervisor().await;
    supervisor.failures.increment("quick").await;

    supervisor.launch("quick", false).await.unwrap();
    wait_until_finished(&supervisor, "quick").await;

    let status = supervisor.store().get_status("quick").await;
    assert_eq!(status.state, JobState::Idle);
    assert!(status.last_run.is_some());
    assert_eq!(status.pid(), None);
    assert_eq!(supervisor.failures.get("quick").await, 0);

    // worker output is drained before the completion is recorded
    let messages: Vec<String> = supervisor
        .store()
        .get_logs("quick", 100)
        .await
        .into_iter()
        .map(|entry| entry.message)
        .collect();
    let position = |needle: &str| messages.iter().position(|message| message == needle);
    let done = position("done").unwrap();
    assert!(position("crawling").unwrap() < done);
    assert!(done < position("completed successfully").unwrap());
    assert_eq!(messages.last().map(String::as_str), Some("completed successfully"));
}

#[tokio::test]
async fn test_failed_run_logs_exit_code_and_output() {
    let supervisor = supervisor().await;

    supervisor.launch("broken", false).await.unwrap();
    wait_until_finished(&supervisor, "broken").await;
    wait_for_log(&supervisor, "broken", "boom").await;

    let status = supervisor.store().get_status("broken").await;
    assert_eq!(status.state, JobState::Failed);
    assert!(status.last_run.is_some());
    assert_eq!(supervisor.failures.get("broken").await, 1);
    assert!(has_log(&supervisor, "broken", "failed with exit code 3").await);
}

#[tokio::test]
async fn test_circuit_breaker_blocks_after_three_failures() {
    let supervisor = supervisor().await;

    for _ in 0..3 {
        supervisor.launch("broken", false).await.unwrap();
        wait_until_finished(&supervisor, "broken").await;
    }
    assert_eq!(supervisor.failures.get("broken").await, 3);

    assert_eq!(
        supervisor.launch("broken", false).await.unwrap(),
        LaunchOutcome::Blocked { failure_count: 3 }
    );
    assert!(!supervisor.registry.contains("broken").await);

    let health = supervisor.health().await;
    assert!(!health.healthy);
    assert_eq!(health.blocked_jobs, vec!["broken".to_string()]);
    assert_eq!(health.failure_counts.get("broken"), Some(&3));
    assert_eq!(health.failed_jobs, vec!["broken".to_string()]);

    // force bypasses the breaker without clearing it
    let forced = supervisor.launch("broken", true).await.unwrap();
    started_pid(&forced);
    wait_until_finished(&supervisor, "broken").await;
    assert_eq!(supervisor.failures.get("broken").await, 4);

    assert_eq!(supervisor.reset_failure_count("broken").await, ResetOutcome::Success);
    assert_eq!(supervisor.failures.get("broken").await, 0);
    assert!(supervisor.health().await.healthy);

    let relaunched = supervisor.launch("broken", false).await.unwrap();
    started_pid(&relaunched);
    wait_until_finished(&supervisor, "broken").await;
}

#[tokio::test]
async fn test_graceful_stop() {
    let supervisor = supervisor().await;

    let pid = started_pid(&supervisor.launch("sleeper", false).await.unwrap());
    assert_eq!(
        supervisor.stop("sleeper").await.unwrap(),
        StopOutcome::Stopped {
            method: StopMethod::Graceful
        }
    );

    assert!(!probe::pid_exists(pid));
    assert!(!supervisor.registry.contains("sleeper").await);
    let status = supervisor.store().get_status("sleeper").await;
    assert_eq!(status.state, JobState::Idle);
    assert!(status.last_run.is_some());
    assert_eq!(status.active_run(), None);
    assert!(has_log(&supervisor, "sleeper", "stopped gracefully").await);
}

#[tokio::test]
async fn test_forced_stop_waits_for_grace_period() {
    let supervisor = supervisor().await;

    let pid = started_pid(&supervisor.launch("stubborn", false).await.unwrap());
    // let the shell install its trap
    sleep(Duration::from_millis(200)).await;

    let began = Instant::now();
    assert_eq!(
        supervisor.stop("stubborn").await.unwrap(),
        StopOutcome::Stopped {
            method: StopMethod::Forced
        }
    );
    assert!(began.elapsed() >= settings().grace_period);
    assert!(!probe::pid_exists(pid));

    assert_eq!(
        supervisor.store().get_status("stubborn").await.state,
        JobState::Idle
    );
    assert!(has_log(&supervisor, "stubborn", "force killed").await);
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let supervisor = supervisor().await;

    assert_eq!(supervisor.stop("sleeper").await.unwrap(), StopOutcome::NotRunning);
    assert_eq!(supervisor.stop("sleeper").await.unwrap(), StopOutcome::NotRunning);

    supervisor.launch("sleeper", false).await.unwrap();
    assert!(matches!(
        supervisor.stop("sleeper").await.unwrap(),
        StopOutcome::Stopped { .. }
    ));
    assert_eq!(supervisor.stop("sleeper").await.unwrap(), StopOutcome::NotRunning);
}

#[tokio::test]
async fn test_timeout_force_stops_and_counts_failure() {
    let supervisor = supervisor().await;

    let pid = started_pid(&supervisor.launch("slow", false).await.unwrap());
    assert_eq!(supervisor.enforce_timeouts().await, 0);

    let mut stopped = 0;
    for _ in 0..50 {
        sleep(Duration::from_millis(100)).await;
        stopped = supervisor.enforce_timeouts().await;
        if stopped > 0 {
            break;
        }
    }
    assert_eq!(stopped, 1);

    assert!(!probe::pid_exists(pid));
    assert!(!supervisor.registry.contains("slow").await);
    let status = supervisor.store().get_status("slow").await;
    assert_eq!(status.state, JobState::Failed);
    assert_eq!(status.active_run(), None);
    assert_eq!(supervisor.failures.get("slow").await, 1);
    assert!(has_log(&supervisor, "slow", "timeout exceeded").await);
}

#[tokio::test]
async fn test_timeout_sweep_spares_run_relaunched_mid_sweep() {
    let supervisor = supervisor().await;
    started_pid(&supervisor.launch("hung", false).await.unwrap());
    started_pid(&supervisor.launch("paced", false).await.unwrap());
    // both overdue
    sleep(Duration::from_millis(1100)).await;

    let sweeper = Arc::clone(&supervisor);
    let sweep = tokio::spawn(async move { sweeper.enforce_timeouts().await });
    sleep(Duration::from_millis(50)).await;

    // replaced while the sweep may still be escalating "hung"
    supervisor.stop("paced").await.unwrap();
    let relaunched = started_pid(&supervisor.launch("paced", false).await.unwrap());
    assert!(sweep.await.unwrap() >= 1);

    assert_eq!(supervisor.registry.pid_of("paced").await, Some(relaunched));
    assert!(probe::pid_exists(relaunched));
    let status = supervisor.store().get_status("paced").await;
    assert_eq!(status.state, JobState::Running);
    assert_eq!(status.pid(), Some(relaunched));

    assert!(!supervisor.registry.contains("hung").await);
    assert_eq!(supervisor.failures.get("hung").await, 1);
    supervisor.stop("paced").await.unwrap();
}

#[tokio::test]
async fn test_defunct_worker_is_reaped_and_counted() {
    let supervisor = supervisor().await;
    let child = tokio::process::Command::new("sh")
        .arg("-c")
        .arg("exit 4")
        .spawn()
        .unwrap();
    let pid = child.id().unwrap();
    let run = ActiveRun {
        pid,
        start_time: Utc::now(),
    };
    supervisor
        .store()
        .update_status("quick", JobState::Running, None, Some(run))
        .await;

    // exited but nobody has waited on it yet
    for _ in 0..250 {
        if probe::is_zombie(pid) {
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }
    assert!(probe::is_zombie(pid));

    let tracked = TrackedProcess::new(child, pid, run.start_time);
    supervisor.complete("quick", tracked, Completion::Defunct).await;

    assert!(!probe::pid_exists(pid));
    let status = supervisor.store().get_status("quick").await;
    assert_eq!(status.state, JobState::Failed);
    assert_eq!(status.active_run(), None);
    assert!(status.last_run.is_some());
    assert_eq!(supervisor.failures.get("quick").await, 1);
    assert!(has_log(&supervisor, "quick", "defunct process reaped, failed with exit code 4").await);
}

#[tokio::test]
async fn test_status_check_error_kills_worker_and_counts_failure() {
    let supervisor = supervisor().await;
    let child = tokio::process::Command::new("sleep").arg("30").spawn().unwrap();
    let pid = child.id().unwrap();
    let run = ActiveRun {
        pid,
        start_time: Utc::now(),
    };
    supervisor
        .store()
        .update_status("sleeper", JobState::Running, None, Some(run))
        .await;

    let tracked = TrackedProcess::new(child, pid, run.start_time);
    supervisor
        .complete(
            "sleeper",
            tracked,
            Completion::ProbeError("permission denied".to_string()),
        )
        .await;

    let status = supervisor.store().get_status("sleeper").await;
    assert_eq!(status.state, JobState::Failed);
    assert_eq!(status.active_run(), None);
    assert_eq!(supervisor.failures.get("sleeper").await, 1);
    assert!(has_log(&supervisor, "sleeper", "status check failed: permission denied").await);

    let mut gone = false;
    for _ in 0..100 {
        if !probe::is_alive(pid, &probe::Identity { pattern: "sleep", started_at: None }) {
            gone = true;
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }
    assert!(gone);
}

#[tokio::test]
async fn test_zombie_scan_reaps_untracked_dead_runs() {
    let supervisor = supervisor().await;
    supervisor.launch("sleeper", false).await.unwrap();

    let run = ActiveRun {
        pid: dead_pid(),
        start_time: Utc::now(),
    };
    supervisor
        .store()
        .update_status("quick", JobState::Running, None, Some(run))
        .await;

    assert_eq!(supervisor.scan_zombies().await, 1);
    assert_eq!(supervisor.scan_zombies().await, 0);

    let status = supervisor.store().get_status("quick").await;
    assert_eq!(status.state, JobState::Failed);
    assert_eq!(status.active_run(), None);
    assert!(has_log(&supervisor, "quick", "stale process reaped").await);

    // tracked jobs are the poller's business
    assert_eq!(
        supervisor.store().get_status("sleeper").await.state,
        JobState::Running
    );
    supervisor.stop("sleeper").await.unwrap();
}

#[tokio::test]
async fn test_restart_reaps_dead_runs_before_returning() {
    let backend = Arc::new(MemoryBackend::new());
    let last_run = Utc::now() - chrono::TimeDelta::hours(3);
    let run = ActiveRun {
        pid: dead_pid(),
        start_time: Utc::now(),
    };
    backend
        .put_status("sleeper", &JobStatus::running(run, Some(last_run)))
        .await
        .unwrap();

    let store = StatusStore::with_backend(Arc::clone(&backend) as Arc<dyn StatusBackend>);
    let supervisor = Supervisor::start(settings(), catalog(), store).await;

    let status = supervisor.store().get_status("sleeper").await;
    assert_eq!(status.state, JobState::Failed);
    assert_eq!(status.last_run, Some(last_run));
    assert_eq!(status.active_run(), None);
    assert!(has_log(&supervisor, "sleeper", "stale process reaped on startup").await);

    // written through to the shared backend
    let persisted = backend.get_status("sleeper").await.unwrap().unwrap();
    assert_eq!(persisted.state, JobState::Failed);

    started_pid(&supervisor.launch("sleeper", false).await.unwrap());
    supervisor.stop("sleeper").await.unwrap();
}

#[tokio::test]
async fn test_restart_keeps_live_orphan_and_can_stop_it() {
    let mut orphan = tokio::process::Command::new("sh")
        .arg("-c")
        .arg("sleep 30; exit 0")
        .arg("sleeper")
        .spawn()
        .unwrap();
    let pid = orphan.id().unwrap();

    let store = StatusStore::in_memory();
    let run = ActiveRun {
        pid,
        start_time: Utc::now(),
    };
    store
        .update_status("sleeper", JobState::Running, None, Some(run))
        .await;

    let supervisor = Supervisor::start(settings(), catalog(), store).await;
    assert_eq!(
        supervisor.store().get_status("sleeper").await.state,
        JobState::Running
    );
    assert_eq!(supervisor.scan_zombies().await, 0);
    assert_eq!(
        supervisor.launch("sleeper", false).await.unwrap(),
        LaunchOutcome::AlreadyRunning { pid: Some(pid) }
    );
    assert!(!supervisor.registry.contains("sleeper").await);

    assert_eq!(
        supervisor.stop("sleeper").await.unwrap(),
        StopOutcome::Stopped {
            method: StopMethod::Graceful
        }
    );
    assert!(!orphan.wait().await.unwrap().success());
    assert_eq!(
        supervisor.store().get_status("sleeper").await.state,
        JobState::Idle
    );
}

#[tokio::test]
async fn test_launch_clears_stale_persisted_run() {
    let supervisor = supervisor().await;
    let stale = dead_pid();
    let run = ActiveRun {
        pid: stale,
        start_time: Utc::now(),
    };
    supervisor
        .store()
        .update_status("sleeper", JobState::Running, None, Some(run))
        .await;

    let pid = started_pid(&supervisor.launch("sleeper", false).await.unwrap());
    assert_ne!(pid, stale);
    assert!(has_log(&supervisor, "sleeper", "cleared stale running state").await);
    assert_eq!(supervisor.store().get_status("sleeper").await.pid(), Some(pid));

    supervisor.stop("sleeper").await.unwrap();
}

#[tokio::test]
async fn test_stop_clears_stale_persisted_run() {
    let supervisor = supervisor().await;
    let run = ActiveRun {
        pid: dead_pid(),
        start_time: Utc::now(),
    };
    supervisor
        .store()
        .update_status("sleeper", JobState::Running, None, Some(run))
        .await;

    assert_eq!(
        supervisor.stop("sleeper").await.unwrap(),
        StopOutcome::Stopped {
            method: StopMethod::StaleCleared
        }
    );
    assert_eq!(
        supervisor.store().get_status("sleeper").await.state,
        JobState::Idle
    );
}

#[tokio::test]
async fn test_spawn_failure_is_recorded() {
    let supervisor = supervisor().await;

    assert!(matches!(
        supervisor.launch("missing", false).await,
        Err(SupervisorError::Spawn { name, .. }) if name == "missing"
    ));
    assert!(!supervisor.registry.contains("missing").await);
    assert_eq!(
        supervisor.store().get_status("missing").await.state,
        JobState::Failed
    );
    assert_eq!(supervisor.failures.get("missing").await, 1);
    assert!(has_log(&supervisor, "missing", "failed to start").await);
}

#[tokio::test]
async fn test_stop_all_stops_every_registered_job() {
    let supervisor = supervisor().await;
    supervisor.launch("sleeper", false).await.unwrap();
    supervisor.launch("stubborn", false).await.unwrap();
    sleep(Duration::from_millis(200)).await;

    let results = supervisor.stop_all().await;
    assert_eq!(results.len(), 2);
    assert_eq!(
        results["sleeper"],
        StopOutcome::Stopped {
            method: StopMethod::Graceful
        }
    );
    assert_eq!(
        results["stubborn"],
        StopOutcome::Stopped {
            method: StopMethod::Forced
        }
    );
    assert!(supervisor.registry.is_empty().await);

    assert!(supervisor.stop_all().await.is_empty());
}

#[tokio::test]
async fn test_stop_all_overrun_still_saves_stopped_state() {
    let backend = Arc::new(SlowWrites::new());
    let store = StatusStore::with_backend(Arc::clone(&backend) as Arc<dyn StatusBackend>);
    let settings = SupervisorSettings {
        grace_period: Duration::from_millis(100),
        kill_wait: Duration::from_millis(100),
        ..settings()
    };
    let supervisor = Supervisor::start(settings, catalog(), store).await;
    started_pid(&supervisor.launch("sleeper", false).await.unwrap());

    // saving the stopped state outlasts the stop-all cap
    backend.delay_ms.store(2000, Ordering::SeqCst);
    let results = supervisor.stop_all().await;
    assert!(matches!(results["sleeper"], StopOutcome::Failed { .. }));
    assert!(!supervisor.registry.contains("sleeper").await);

    let mut saved = false;
    for _ in 0..100 {
        sleep(Duration::from_millis(50)).await;
        let persisted = backend.inner.get_status("sleeper").await.unwrap();
        if persisted.is_some_and(|status| status.state == JobState::Idle) {
            saved = true;
            break;
        }
    }
    assert!(saved);
    wait_for_log(&supervisor, "sleeper", "stopped gracefully").await;
}

#[tokio::test]
async fn test_status_and_health_reports() {
    let supervisor = supervisor().await;
    let health = supervisor.health().await;
    assert!(health.healthy);
    assert_eq!(health.running_count, 0);
    assert_eq!(health.persistence, BackendKind::Memory);

    supervisor.launch("quick", false).await.unwrap();
    wait_until_finished(&supervisor, "quick").await;
    let pid = started_pid(&supervisor.launch("sleeper", false).await.unwrap());

    let report = supervisor.status().await;
    assert_eq!(report.len(), supervisor.catalog().len());

    let quick = &report["quick"];
    assert_eq!(quick.state, JobState::Idle);
    assert_eq!(quick.failure_count, 0);
    assert!(!quick.logs.is_empty());

    let sleeper = &report["sleeper"];
    assert_eq!(sleeper.state, JobState::Running);
    assert_eq!(sleeper.pid, Some(pid));
    assert!(sleeper.start_time.is_some());

    // never launched, materialized as idle
    assert_eq!(report["slow"].state, JobState::Idle);
    assert_eq!(report["slow"].last_run, None);

    assert_eq!(supervisor.health().await.running_count, 1);
    supervisor.stop("sleeper").await.unwrap();
}

#[tokio::test]
async fn test_background_loops_finish_runs_and_shut_down() {
    let supervisor = supervisor().await;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = supervisor.spawn_background(&shutdown_rx);

    supervisor.launch("quick", false).await.unwrap();
    supervisor.launch("slow", false).await.unwrap();

    let mut settled = false;
    for _ in 0..100 {
        sleep(Duration::from_millis(50)).await;
        let quick = supervisor.store().get_status("quick").await;
        let slow = supervisor.store().get_status("slow").await;
        if quick.state == JobState::Idle && slow.state == JobState::Failed {
            settled = true;
            break;
        }
    }
    assert!(settled);
    assert!(supervisor.registry.is_empty().await);

    shutdown_tx.send(true).unwrap();
    for handle in handles {
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
