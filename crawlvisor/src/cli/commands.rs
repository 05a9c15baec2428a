//! CLI command execution.
//!
//! This is a thin client - everything except `serve` goes through the server.

use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::config::Config;
use crate::models::{
    Health, JobReport, LaunchOutcome, LogEntry, ResetOutcome, StopMethod, StopOutcome,
};
use crate::server;

use super::args::{Cli, Commands};

// === HTTP Client for Server Communication ===

/// Job summary from the catalog listing.
#[derive(Debug, Deserialize)]
struct JobSummary {
    name: String,
    program: String,
    args: Vec<String>,
    timeout: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

fn job_url(server: &str, name: &str, action: &str) -> String {
    format!(
        "{}/api/jobs/{}/{action}",
        server.trim_end_matches('/'),
        urlencoding::encode(name)
    )
}

fn api_url(server: &str, path: &str) -> String {
    format!("{}/api/{path}", server.trim_end_matches('/'))
}

async fn read_response<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        match resp.json::<ErrorBody>().await {
            Ok(body) => bail!("Server returned {status}: {}", body.error),
            Err(_) => bail!("Server returned {status}"),
        }
    }
    resp.json().await.context("Failed to parse response")
}

async fn get_json<T: DeserializeOwned>(url: &str) -> Result<T> {
    let resp = reqwest::Client::new()
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to reach crawlvisor server at {url}"))?;
    read_response(resp).await
}

async fn post_json<T: DeserializeOwned>(url: &str, body: Option<serde_json::Value>) -> Result<T> {
    let mut request = reqwest::Client::new().post(url);
    if let Some(body) = body {
        request = request.json(&body);
    }
    let resp = request
        .send()
        .await
        .with_context(|| format!("Failed to reach crawlvisor server at {url}"))?;
    read_response(resp).await
}

// === Command Execution ===

pub async fn execute(cli: Cli) -> Result<()> {
    let server = cli.server.as_str();

    match cli.command {
        Commands::Serve => {
            let config = Config::from_env().context("Failed to load configuration")?;
            server::start_server(config).await
        }
        Commands::Jobs => list_jobs(server).await,
        Commands::Launch { name, force } => launch_job(server, &name, force).await,
        Commands::Stop { name } => stop_job(server, &name).await,
        Commands::StopAll => stop_all(server).await,
        Commands::Status => show_status(server).await,
        Commands::Logs { name, limit } => show_logs(server, &name, limit).await,
        Commands::Reset { name } => reset_job(server, &name).await,
        Commands::Health => show_health(server).await,
    }
}

async fn list_jobs(server: &str) -> Result<()> {
    let jobs: Vec<JobSummary> = get_json(&api_url(server, "jobs")).await?;
    if jobs.is_empty() {
        println!("No jobs configured.");
        return Ok(());
    }

    println!("{:<16} {:<10} {}", "NAME", "TIMEOUT", "COMMAND");
    println!("{}", "-".repeat(60));
    for job in jobs {
        let timeout = job
            .timeout
            .map_or_else(|| "default".to_string(), format_secs);
        let command = std::iter::once(job.program)
            .chain(job.args)
            .collect::<Vec<_>>()
            .join(" ");
        println!("{:<16} {:<10} {}", job.name, timeout, command);
    }
    Ok(())
}

async fn launch_job(server: &str, name: &str, force: bool) -> Result<()> {
    let body = serde_json::json!({ "force": force });
    let outcome: LaunchOutcome = post_json(&job_url(server, name, "launch"), Some(body)).await?;

    match outcome {
        LaunchOutcome::Started { pid } => println!("✓ {name} started (pid {pid})"),
        LaunchOutcome::AlreadyRunning { pid: Some(pid) } => {
            println!("{name} is already running (pid {pid})");
        }
        LaunchOutcome::AlreadyRunning { pid: None } => println!("{name} is already running"),
        LaunchOutcome::Blocked { failure_count } => {
            println!("✗ {name} is blocked after {failure_count} consecutive failures");
            println!("  Retry with --force, or run: crawlvisor reset {name}");
        }
    }
    Ok(())
}

async fn stop_job(server: &str, name: &str) -> Result<()> {
    let outcome: StopOutcome = post_json(&job_url(server, name, "stop"), None).await?;
    println!("{name}: {}", describe_stop(&outcome));
    Ok(())
}

async fn stop_all(server: &str) -> Result<()> {
    let outcomes: BTreeMap<String, StopOutcome> = post_json(&api_url(server, "stop-all"), None).await?;
    if outcomes.is_empty() {
        println!("No jobs were running.");
        return Ok(());
    }
    for (name, outcome) in &outcomes {
        println!("{name}: {}", describe_stop(outcome));
    }
    Ok(())
}

fn describe_stop(outcome: &StopOutcome) -> String {
    match outcome {
        StopOutcome::Stopped { method } => match method {
            StopMethod::Graceful => "stopped".to_string(),
            StopMethod::Forced => "force killed".to_string(),
            StopMethod::AlreadyExited => "had already exited".to_string(),
            StopMethod::StaleCleared => "cleared stale state".to_string(),
        },
        StopOutcome::NotRunning => "not running".to_string(),
        StopOutcome::Failed { error } => format!("stop failed: {error}"),
    }
}

async fn show_status(server: &str) -> Result<()> {
    let reports: BTreeMap<String, JobReport> = get_json(&api_url(server, "status")).await?;

    println!(
        "{:<16} {:<8} {:<8} {:<9} {}",
        "JOB", "STATE", "PID", "FAILURES", "LAST RUN"
    );
    println!("{}", "-".repeat(70));
    for (name, report) in &reports {
        let pid = report.pid.map_or_else(|| "-".to_string(), |pid| pid.to_string());
        println!(
            "{:<16} {:<8} {:<8} {:<9} {}",
            name,
            report.state,
            pid,
            report.failure_count,
            format_time(report.last_run),
        );
    }
    Ok(())
}

async fn show_logs(server: &str, name: &str, limit: usize) -> Result<()> {
    let url = format!("{}?limit={limit}", job_url(server, name, "logs"));
    let logs: Vec<LogEntry> = get_json(&url).await?;

    if logs.is_empty() {
        println!("No logs for {name}.");
        return Ok(());
    }
    for entry in logs {
        println!("{}  {}", format_time(Some(entry.timestamp)), entry.message);
    }
    Ok(())
}

async fn reset_job(server: &str, name: &str) -> Result<()> {
    let outcome: ResetOutcome = post_json(&job_url(server, name, "reset"), None).await?;
    match outcome {
        ResetOutcome::Success => println!("✓ {name} failure count reset"),
        ResetOutcome::NotFound => println!("Unknown job: {name}"),
    }
    Ok(())
}

async fn show_health(server: &str) -> Result<()> {
    let health: Health = get_json(&api_url(server, "health")).await?;

    let verdict = if health.healthy { "healthy" } else { "degraded" };
    println!("Supervisor:   {verdict}");
    println!("Persistence:  {:?}", health.persistence);
    println!("Running jobs: {}", health.running_count);
    if !health.failed_jobs.is_empty() {
        println!("Failed:       {}", health.failed_jobs.join(", "));
    }
    if !health.blocked_jobs.is_empty() {
        println!("Blocked:      {}", health.blocked_jobs.join(", "));
    }
    for (name, count) in &health.failure_counts {
        println!("  {name}: {count} consecutive failures");
    }
    Ok(())
}

fn format_time(at: Option<DateTime<Utc>>) -> String {
    at.map_or_else(
        || "never".to_string(),
        |at| at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string(),
    )
}

fn format_secs(secs: u64) -> String {
    if secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}
