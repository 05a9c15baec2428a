//! Configuration loaded from the environment.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;

use crate::db::StoreOptions;

/// Default control API port.
pub const DEFAULT_PORT: u16 = 58231;

/// Consecutive failures after which launches are blocked.
pub const FAILURE_THRESHOLD: u32 = 3;

const STATE_DIR: &str = ".crawlvisor";
const LEGACY_STATUS_FILE: &str = "crawler_status.json";

/// Timing and threshold knobs for the supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    /// How often the status poller checks registered processes.
    pub poll_interval: Duration,
    /// How often the zombie and timeout detector runs.
    pub scan_interval: Duration,
    /// Wait between the termination signal and the forced kill on stop.
    pub grace_period: Duration,
    /// Grace used when a job is stopped for exceeding its timeout.
    pub timeout_grace: Duration,
    /// How long to wait for a killed process to disappear.
    pub kill_wait: Duration,
    /// How long to wait when reaping a defunct child.
    pub reap_wait: Duration,
    /// Timeout for jobs that do not define their own.
    pub default_timeout: Duration,
    pub failure_threshold: u32,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            scan_interval: Duration::from_secs(30),
            grace_period: Duration::from_secs(15),
            timeout_grace: Duration::from_secs(5),
            kill_wait: Duration::from_secs(5),
            reap_wait: Duration::from_secs(5),
            default_timeout: Duration::from_secs(2 * 60 * 60),
            failure_threshold: FAILURE_THRESHOLD,
        }
    }
}

impl SupervisorSettings {
    /// Upper bound on how long a single stop can take.
    pub fn stop_budget(&self) -> Duration {
        self.grace_period + self.kill_wait
    }
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub db_connect_timeout: Duration,
    pub legacy_status_file: Option<PathBuf>,
    pub port: u16,
    pub worker_program: String,
    pub supervisor: SupervisorSettings,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let defaults = SupervisorSettings::default();

        Ok(Self {
            database_url: env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
            db_connect_timeout: secs_var("CRAWLVISOR_DB_CONNECT_SECS", Duration::from_secs(5))?,
            legacy_status_file: env::var("CRAWLVISOR_LEGACY_STATUS")
                .ok()
                .map(PathBuf::from)
                .or_else(default_legacy_status_file),
            port: env::var("CRAWLVISOR_PORT")
                .unwrap_or_else(|_| DEFAULT_PORT.to_string())
                .parse()
                .context("CRAWLVISOR_PORT must be a valid number")?,
            worker_program: env::var("CRAWLVISOR_WORKER")
                .unwrap_or_else(|_| "crawl-worker".to_string()),
            supervisor: SupervisorSettings {
                poll_interval: secs_var("CRAWLVISOR_POLL_SECS", defaults.poll_interval)?,
                scan_interval: secs_var("CRAWLVISOR_SCAN_SECS", defaults.scan_interval)?,
                grace_period: secs_var("CRAWLVISOR_GRACE_SECS", defaults.grace_period)?,
                default_timeout: secs_var(
                    "CRAWLVISOR_DEFAULT_TIMEOUT_SECS",
                    defaults.default_timeout,
                )?,
                ..defaults
            },
        })
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            database_url: self.database_url.clone(),
            legacy_snapshot: self.legacy_status_file.clone(),
            connect_timeout: self.db_connect_timeout,
        }
    }
}

fn default_legacy_status_file() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(STATE_DIR).join(LEGACY_STATUS_FILE))
}

fn secs_var(key: &str, default: Duration) -> Result<Duration> {
    parse_secs(key, env::var(key).ok().as_deref(), default)
}

fn parse_secs(key: &str, value: Option<&str>, default: Duration) -> Result<Duration> {
    match value {
        None | Some("") => Ok(default),
        Some(raw) => {
            let secs: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("{key} must be a whole number of seconds"))?;
            anyhow::ensure!(secs > 0, "{key} must be greater than zero");
            Ok(Duration::from_secs(secs))
        }
    }
}
