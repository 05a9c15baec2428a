//! Crawlvisor server - HTTP control API in front of the job supervisor.
//!
//! Architecture:
//! - One server process owns the supervisor and its background loops
//! - Status is persisted in Postgres when `DATABASE_URL` is set, in memory otherwise
//! - The CLI is a thin client that talks to the server via HTTP
//! - On Ctrl-C or SIGTERM the server stops accepting requests, then stops every job
//!
//! Endpoints:
//! - GET /api/jobs - Job catalog
//! - GET /api/status - Status, failure count and recent logs per job
//! - GET /api/health - Aggregate health
//! - POST /api/jobs/{name}/launch - Launch a job (body `{"force": true}` optional)
//! - POST /api/jobs/{name}/stop - Stop a job
//! - POST /api/jobs/{name}/reset - Reset a job's failure count
//! - GET /api/jobs/{name}/logs - Recent log lines (`?limit=N`)
//! - POST /api/stop-all - Stop every running job

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::db::{StatusStore, LOG_RETENTION};
use crate::error::SupervisorError;
use crate::models::{
    Health, JobCatalog, JobDefinition, JobReport, LaunchOutcome, LogEntry, ResetOutcome,
    StopOutcome,
};
use crate::supervisor::Supervisor;

/// Shared server state.
pub struct ServerState {
    supervisor: Arc<Supervisor>,
}

// === Request/Response Types ===

/// Optional body of a launch request.
#[derive(Debug, Default, Deserialize)]
pub struct LaunchRequest {
    /// Launch even if the circuit breaker is open.
    #[serde(default)]
    pub force: bool,
}

/// Query parameters for log listing.
#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Error returned by handlers, rendered as `{"error": ...}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<SupervisorError> for ApiError {
    fn from(err: SupervisorError) -> Self {
        let status = match err {
            SupervisorError::UnknownJob(_) => StatusCode::NOT_FOUND,
            SupervisorError::Spawn { .. } => {
                tracing::error!("{err}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

// === Server Lifecycle ===

/// Start the supervisor and serve the control API until a shutdown signal.
pub async fn start_server(config: Config) -> Result<()> {
    let store = StatusStore::open(&config.store_options()).await;
    let catalog = JobCatalog::builtin(&config.worker_program);
    let supervisor = Supervisor::start(config.supervisor.clone(), catalog, store).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let loops = supervisor.spawn_background(&shutdown_rx);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;
    tracing::info!("crawlvisor server listening on http://{addr}");

    axum::serve(listener, router(Arc::clone(&supervisor)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("shutting down");
    let _ = shutdown_tx.send(true);
    for handle in loops {
        if let Err(err) = handle.await {
            tracing::error!("background loop ended abnormally: {err}");
        }
    }

    let stopped = supervisor.stop_all().await;
    for (name, outcome) in &stopped {
        tracing::info!(job = %name, ?outcome, "stopped on shutdown");
    }

    Ok(())
}

/// Routes of the control API.
pub fn router(supervisor: Arc<Supervisor>) -> Router {
    let state = Arc::new(ServerState { supervisor });

    Router::new()
        .route("/api/jobs", get(list_jobs))
        .route("/api/status", get(get_status))
        .route("/api/health", get(get_health))
        .route("/api/jobs/{name}/launch", post(launch_job))
        .route("/api/jobs/{name}/stop", post(stop_job))
        .route("/api/jobs/{name}/reset", post(reset_job))
        .route("/api/jobs/{name}/logs", get(job_logs))
        .route("/api/stop-all", post(stop_all))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl-C: {err}");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!("failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

// === Handlers ===

async fn list_jobs(State(state): State<Arc<ServerState>>) -> Json<Vec<JobDefinition>> {
    Json(state.supervisor.catalog().iter().cloned().collect())
}

async fn get_status(State(state): State<Arc<ServerState>>) -> Json<BTreeMap<String, JobReport>> {
    Json(state.supervisor.status().await)
}

async fn get_health(State(state): State<Arc<ServerState>>) -> Json<Health> {
    Json(state.supervisor.health().await)
}

async fn launch_job(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Json<LaunchOutcome>, ApiError> {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        LaunchRequest::default()
    } else {
        serde_json::from_slice::<LaunchRequest>(&body)
            .map_err(|err| ApiError::bad_request(format!("invalid launch request: {err}")))?
    };

    let outcome = state.supervisor.launch(&name, request.force).await?;
    Ok(Json(outcome))
}

async fn stop_job(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> Result<Json<StopOutcome>, ApiError> {
    Ok(Json(state.supervisor.stop(&name).await?))
}

async fn reset_job(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> Result<Json<ResetOutcome>, ApiError> {
    match state.supervisor.reset_failure_count(&name).await {
        ResetOutcome::NotFound => Err(SupervisorError::unknown(&name).into()),
        outcome => Ok(Json(outcome)),
    }
}

async fn job_logs(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
    Query(params): Query<LogsQuery>,
) -> Result<Json<Vec<LogEntry>>, ApiError> {
    let limit = params.limit.unwrap_or(LOG_RETENTION).min(LOG_RETENTION);
    Ok(Json(state.supervisor.logs(&name, limit).await?))
}

async fn stop_all(State(state): State<Arc<ServerState>>) -> Json<BTreeMap<String, StopOutcome>> {
    Json(state.supervisor.stop_all().await)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::SupervisorSettings;

    async fn serve() -> (String, Arc<Supervisor>) {
        let catalog = JobCatalog::new(vec![
            JobDefinition::shell("quick", "echo fetched; exit 0"),
            JobDefinition::shell("sleeper", "sleep 30; exit 0"),
            JobDefinition::new("missing", "/nonexistent/crawl-worker-binary"),
        ]);
        let settings = SupervisorSettings {
            grace_period: Duration::from_millis(500),
            ..SupervisorSettings::default()
        };
        let supervisor = Supervisor::start(settings, catalog, StatusStore::in_memory()).await;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(Arc::clone(&supervisor));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), supervisor)
    }

    #[tokio::test]
    async fn test_launch_and_stop_over_http() {
        let (base, _supervisor) = serve().await;
        let client = reqwest::Client::new();

        let launched: serde_json::Value = client
            .post(format!("{base}/api/jobs/sleeper/launch"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(launched["state"], "started");

        let again: serde_json::Value = client
            .post(format!("{base}/api/jobs/sleeper/launch"))
            .json(&serde_json::json!({"force": true}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(again["state"], "already_running");
        assert_eq!(again["pid"], launched["pid"]);

        let health: serde_json::Value = client
            .get(format!("{base}/api/health"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["running_count"], 1);
        assert_eq!(health["healthy"], true);
        assert_eq!(health["persistence"], "memory");

        let stopped: serde_json::Value = client
            .post(format!("{base}/api/jobs/sleeper/stop"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(stopped["state"], "stopped");
        assert_eq!(stopped["method"], "graceful");

        let logs: Vec<LogEntry> = client
            .get(format!("{base}/api/jobs/sleeper/logs?limit=1"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].message, "stopped gracefully");
    }

    #[tokio::test]
    async fn test_errors_map_to_status_codes() {
        let (base, _supervisor) = serve().await;
        let client = reqwest::Client::new();

        let unknown = client
            .post(format!("{base}/api/jobs/nope/launch"))
            .send()
            .await
            .unwrap();
        assert_eq!(unknown.status(), reqwest::StatusCode::NOT_FOUND);
        let body: serde_json::Value = unknown.json().await.unwrap();
        assert_eq!(body["error"], "unknown job: nope");

        let missing = client
            .post(format!("{base}/api/jobs/missing/launch"))
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);

        let malformed = client
            .post(format!("{base}/api/jobs/quick/launch"))
            .body("{force")
            .send()
            .await
            .unwrap();
        assert_eq!(malformed.status(), reqwest::StatusCode::BAD_REQUEST);

        let reset = client
            .post(format!("{base}/api/jobs/nope/reset"))
            .send()
            .await
            .unwrap();
        assert_eq!(reset.status(), reqwest::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_catalog_and_status_listing() {
        let (base, _supervisor) = serve().await;
        let client = reqwest::Client::new();

        let jobs: serde_json::Value = client
            .get(format!("{base}/api/jobs"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let names: Vec<&str> = jobs
            .as_array()
            .unwrap()
            .iter()
            .map(|job| job["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["quick", "sleeper", "missing"]);

        let status: serde_json::Value = client
            .get(format!("{base}/api/status"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status["quick"]["state"], "idle");
        assert_eq!(status["quick"]["failure_count"], 0);

        let stopped: serde_json::Value = client
            .post(format!("{base}/api/stop-all"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(stopped, serde_json::json!({}));
    }
}
