//! Postgres status backend.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};

use super::store::{BackendKind, StatusBackend, LOG_RETENTION};
use crate::models::{ActiveRun, JobState, JobStatus, LogEntry};

#[derive(Debug, sqlx::FromRow)]
struct StatusRow {
    job_name: String,
    state: String,
    last_run: Option<DateTime<Utc>>,
    pid: Option<i32>,
    start_time: Option<DateTime<Utc>>,
}

impl StatusRow {
    fn into_status(self) -> Result<(String, JobStatus)> {
        let state = JobState::from_str(&self.state)
            .with_context(|| format!("Unknown job state '{}' for {}", self.state, self.job_name))?;
        let run = match (self.pid, self.start_time) {
            (Some(pid), Some(start_time)) => Some(ActiveRun {
                pid: u32::try_from(pid).context("Negative pid in job_status")?,
                start_time,
            }),
            _ => None,
        };
        Ok((self.job_name, JobStatus::new(state, self.last_run, run)))
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LogRow {
    job_name: String,
    message: String,
    logged_at: DateTime<Utc>,
}

impl From<LogRow> for LogEntry {
    fn from(row: LogRow) -> Self {
        Self::new(row.job_name, row.message, row.logged_at)
    }
}

/// Durable backend over a Postgres pool.
#[derive(Debug, Clone)]
pub struct PostgresBackend {
    pool: PgPool,
}

impl PostgresBackend {
    /// Connect and apply migrations.
    pub async fn connect(database_url: &str, acquire_timeout: Duration) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run migrations")?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl StatusBackend for PostgresBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Postgres
    }

    async fn get_status(&self, name: &str) -> Result<Option<JobStatus>> {
        let row = sqlx::query_as::<_, StatusRow>(
            r"
            SELECT job_name, state, last_run, pid, start_time
            FROM job_status
            WHERE job_name = $1
            ",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| row.into_status().map(|(_, status)| status))
            .transpose()
    }

    async fn all_statuses(&self) -> Result<HashMap<String, JobStatus>> {
        let rows = sqlx::query_as::<_, StatusRow>(
            r"
            SELECT job_name, state, last_run, pid, start_time
            FROM job_status
            ORDER BY job_name
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(StatusRow::into_status).collect()
    }

    async fn put_status(&self, name: &str, status: &JobStatus) -> Result<()> {
        let run = status.active_run();
        let pid = run
            .map(|run| i32::try_from(run.pid))
            .transpose()
            .context("pid does not fit in an INTEGER column")?;

        sqlx::query(
            r"
            INSERT INTO job_status (job_name, state, last_run, pid, start_time, updated_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            ON CONFLICT (job_name) DO UPDATE
            SET state = EXCLUDED.state,
                last_run = EXCLUDED.last_run,
                pid = EXCLUDED.pid,
                start_time = EXCLUDED.start_time,
                updated_at = NOW()
            ",
        )
        .bind(name)
        .bind(status.state.as_str())
        .bind(status.last_run)
        .bind(pid)
        .bind(run.map(|run| run.start_time))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn add_log(&self, entry: &LogEntry) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO job_logs (job_name, message, logged_at) VALUES ($1, $2, $3)")
            .bind(&entry.job_name)
            .bind(&entry.message)
            .bind(entry.timestamp)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r"
            DELETE FROM job_logs
            WHERE job_name = $1
              AND id NOT IN (
                  SELECT id FROM job_logs
                  WHERE job_name = $1
                  ORDER BY id DESC
                  LIMIT $2
              )
            ",
        )
        .bind(&entry.job_name)
        .bind(LOG_RETENTION as i64)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn logs(&self, name: &str, limit: usize) -> Result<Vec<LogEntry>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query_as::<_, LogRow>(
            r"
            SELECT job_name, message, logged_at
            FROM (
                SELECT id, job_name, message, logged_at
                FROM job_logs
                WHERE job_name = $1
                ORDER BY id DESC
                LIMIT $2
            ) AS recent
            ORDER BY id ASC
            ",
        )
        .bind(name)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(LogEntry::from).collect())
    }

    async fn has_rows(&self) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM job_status)")
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }
}
