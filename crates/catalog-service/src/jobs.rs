// crates/catalog-service/src/jobs.rs
// ============================================================================
// Module: Job & Metrics Control-Plane Handlers
// Description: Start/stop/status for the normalization and IC classification
// job families, the current-IC-tasks view, the metrics endpoint, and
// Snapshot CRUD (spec §4.11, §6).
// Purpose: The JSON API operators and dashboards talk to, independent of the
// XML producer protocol in `erp.rs`.
// Dependencies: axum, catalog-core, catalog-classify, catalog-normalize,
// serde, tokio
// ============================================================================

use std::sync::Arc;

use axum::Json;
use axum::extract::Path;
use axum::extract::State;
use catalog_core::domain::Snapshot;
use catalog_core::domain::SnapshotType;
use catalog_core::identifiers::ClientId;
use catalog_core::identifiers::ProjectId;
use catalog_core::identifiers::SnapshotId;
use catalog_core::job::JobProgress;
use serde::Deserialize;
use serde::Serialize;

use crate::error::ServiceError;
use crate::events::ServiceEvent;
use crate::state::AppState;
use crate::state::DEFAULT_CLIENT_ID;
use crate::state::SOURCE_TABLE_NAME;

/// Request body for `POST /jobs/normalization/start` (spec §6).
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StartNormalizationRequest {
    /// Whether AI enrichment should be attempted for ambiguous rows.
    pub use_ai: bool,
    /// Minimum AI confidence to accept an AI-enhanced result.
    pub min_confidence: f64,
    /// Unused here; rate limiting is configured at provider build time, kept
    /// for request-shape compatibility (spec §6).
    pub rate_limit_delay_ms: u64,
    /// Unused here for the same reason as `rate_limit_delay_ms`.
    pub max_retries: u32,
    /// Optional AI model override; unused, kept for request-shape
    /// compatibility since the model is fixed at provider build time.
    pub model: Option<String>,
    /// Database id scoping the benchmark lookup's tenancy; defaults to
    /// [`DEFAULT_CLIENT_ID`] if absent or unmatched.
    pub database: Option<i64>,
    /// Unused here; IC classification is started via its own endpoint.
    pub use_ic: bool,
}

impl Default for StartNormalizationRequest {
    fn default() -> Self {
        Self { use_ai: true, min_confidence: 0.0, rate_limit_delay_ms: 0, max_retries: 0, model: None, database: None, use_ic: false }
    }
}

/// Status shape shared by every job family (spec §4.11).
#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    /// Whether the job is currently running or draining a stop.
    pub is_running: bool,
    /// `processed / total` as a percentage.
    pub progress_percent: f64,
    /// Units processed so far.
    pub processed: u64,
    /// Total units, if known.
    pub total: u64,
    /// Units that completed successfully.
    pub success: u64,
    /// Units that errored.
    pub errors: u64,
    /// Seconds elapsed since the run started, if running.
    pub elapsed: Option<f64>,
    /// `processed / elapsed_seconds`.
    pub rate: f64,
}

impl JobStatusResponse {
    fn from_progress(progress: JobProgress) -> Self {
        let elapsed = progress.started_at.map(|started| started.elapsed_since(crate::now()).as_seconds_f64());
        let rate = elapsed.map(|secs| progress.rate_per_second(secs)).unwrap_or(0.0);
        Self {
            is_running: progress.state.is_running(),
            progress_percent: progress.progress_percent(),
            processed: progress.processed,
            total: progress.total,
            success: progress.success,
            errors: progress.errors,
            elapsed,
            rate,
        }
    }
}

/// `POST /jobs/normalization/start`.
///
/// # Errors
///
/// Returns [`ServiceError::JobAlreadyRunning`] if a normalization run is
/// already in progress.
pub async fn start_normalization(State(state): State<Arc<AppState>>, Json(request): Json<StartNormalizationRequest>) -> Result<Json<JobStatusResponse>, ServiceError> {
    if state.normalizer.subscribe().borrow().state.is_running() {
        return Err(ServiceError::JobAlreadyRunning);
    }
    let _ = request.model;
    let _ = request.use_ic;
    let _ = request.rate_limit_delay_ms;
    let _ = request.max_retries;

    let client_id = request.database.map_or(DEFAULT_CLIENT_ID, |raw| ClientId(raw));
    let normalizer = Arc::clone(&state.normalizer);
    let events = state.events.clone();
    tokio::spawn(async move {
        match normalizer.run(SOURCE_TABLE_NAME, client_id).await {
            Ok(summary) => events.publish(ServiceEvent::Log {
                job: "normalization",
                message: format!("normalization finished: {} rows, {} groups", summary.success, summary.groups),
            }),
            Err(error) => events.publish(ServiceEvent::Log { job: "normalization", message: format!("normalization failed: {error}") }),
        }
    });

    Ok(Json(JobStatusResponse::from_progress(*state.normalizer.subscribe().borrow())))
}

/// `POST /jobs/normalization/stop`.
pub async fn stop_normalization(State(state): State<Arc<AppState>>) -> Json<JobStatusResponse> {
    state.normalizer.request_stop();
    Json(JobStatusResponse::from_progress(*state.normalizer.subscribe().borrow()))
}

/// `GET /jobs/normalization/status`.
pub async fn normalization_status(State(state): State<Arc<AppState>>) -> Json<JobStatusResponse> {
    Json(JobStatusResponse::from_progress(*state.normalizer.subscribe().borrow()))
}

/// Request body for `POST /jobs/classification/start` (spec §6 "IC
/// reclassify").
#[derive(Debug, Deserialize)]
pub struct StartClassificationRequest {
    /// Maximum groups to classify this run; `0` means all pending groups.
    #[serde(default)]
    pub limit: usize,
}

/// `POST /jobs/classification/start`.
///
/// # Errors
///
/// Returns [`ServiceError::JobAlreadyRunning`] if an IC run is already in
/// progress.
pub async fn start_classification(State(state): State<Arc<AppState>>, Json(request): Json<StartClassificationRequest>) -> Result<Json<JobStatusResponse>, ServiceError> {
    if state.classifier.subscribe().borrow().state.is_running() {
        return Err(ServiceError::JobAlreadyRunning);
    }

    let normalizer_running = state.normalizer.subscribe().borrow().state.is_running();
    let classifier = Arc::clone(&state.classifier);
    let events = state.events.clone();
    tokio::spawn(async move {
        match classifier.run(request.limit, normalizer_running).await {
            Ok(summary) => events.publish(ServiceEvent::Log { job: "classification", message: summary.message }),
            Err(error) => events.publish(ServiceEvent::Log { job: "classification", message: format!("IC classification failed to start: {error}") }),
        }
    });

    Ok(Json(JobStatusResponse::from_progress(*state.classifier.subscribe().borrow())))
}

/// `POST /jobs/classification/stop`.
pub async fn stop_classification(State(state): State<Arc<AppState>>) -> Json<JobStatusResponse> {
    state.classifier.request_stop();
    Json(JobStatusResponse::from_progress(*state.classifier.subscribe().borrow()))
}

/// `GET /jobs/classification/status`.
pub async fn classification_status(State(state): State<Arc<AppState>>) -> Json<JobStatusResponse> {
    Json(JobStatusResponse::from_progress(*state.classifier.subscribe().borrow()))
}

/// Response shape for `GET /jobs/classification/current-tasks` (spec §6).
#[derive(Debug, Serialize)]
pub struct CurrentTasksResponse {
    /// Every worker's currently in-flight group.
    pub current_tasks: Vec<catalog_classify::CurrentTask>,
    /// `current_tasks.len()`.
    pub count: usize,
}

/// `GET /jobs/classification/current-tasks`.
pub async fn current_tasks(State(state): State<Arc<AppState>>) -> Json<CurrentTasksResponse> {
    let current_tasks = state.classifier.current_tasks();
    let count = current_tasks.len();
    Json(CurrentTasksResponse { current_tasks, count })
}

/// `GET /metrics`.
pub async fn metrics(State(state): State<Arc<AppState>>) -> Json<crate::metrics::MetricsSnapshot> {
    Json(state.metrics.sample())
}

/// Request body for `POST /snapshots`.
#[derive(Debug, Deserialize)]
pub struct CreateSnapshotRequest {
    /// Snapshot display name.
    pub name: String,
    /// Owning project, if scoped.
    pub project_id: Option<i64>,
    /// Owning client, if scoped.
    pub client_id: Option<i64>,
    /// Upload row ids to include, in order.
    pub included_uploads: Vec<i64>,
}

/// `POST /snapshots`.
///
/// # Errors
///
/// Returns [`ServiceError::Core`] if the store write fails.
pub async fn create_snapshot(State(state): State<Arc<AppState>>, Json(request): Json<CreateSnapshotRequest>) -> Result<Json<Snapshot>, ServiceError> {
    let snapshot = Snapshot {
        id: SnapshotId(0),
        name: request.name,
        r#type: SnapshotType::Manual,
        project_id: request.project_id.map(ProjectId),
        client_id: request.client_id.map(ClientId),
        included_uploads: request.included_uploads.into_iter().map(Into::into).collect(),
    };
    let created = state.catalog_store.create_snapshot(snapshot)?;
    Ok(Json(created))
}

/// `GET /snapshots`.
///
/// # Errors
///
/// Returns [`ServiceError::Core`] if the store read fails.
pub async fn list_snapshots(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Snapshot>>, ServiceError> {
    Ok(Json(state.catalog_store.list_snapshots()?))
}

/// `GET /snapshots/:id`.
///
/// # Errors
///
/// Returns [`ServiceError::Core`] with kind `not_found` if no snapshot with
/// that id exists.
pub async fn get_snapshot(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> Result<Json<Snapshot>, ServiceError> {
    let snapshots = state.catalog_store.list_snapshots()?;
    snapshots
        .into_iter()
        .find(|snapshot| snapshot.id.get() == id)
        .map(Json)
        .ok_or_else(|| catalog_core::CoreError::NotFound(format!("snapshot {id}")).into())
}
