use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post, put},
    Router,
};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};
use voice_journal_schemas::{LogId, Pagination, TodoId, TodoUpdate};

use crate::database::Table;
use crate::error::JournalError;
use crate::extractor::SegmentExtractor;
use crate::retry::{MaxAttempts, RetryLedger};
use crate::storage::StorageCoordinator;
use crate::worker::AnalysisOutcome;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<StorageCoordinator>,
    pub extractor: Arc<SegmentExtractor>,
    pub retry_policy: MaxAttempts,
    pub outcomes: mpsc::UnboundedSender<AnalysisOutcome>,
}

type ApiError = (StatusCode, String);

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(get_stats))
        .route("/extract", post(extract_preview))

        // Logs
        .route("/logs", get(list_logs).post(ingest_log))
        .route("/logs/pending", post(create_pending_log))
        .route("/logs/:id", get(get_log).delete(delete_log))
        .route("/logs/:id/summary", put(update_summary))

        // Analysis lifecycle
        .route("/logs/:id/analysis", post(submit_analysis))
        .route("/logs/:id/failure", post(report_failure))
        .route("/logs/:id/retry/reset", post(reset_retries))
        .route("/retry/candidates", get(list_retry_candidates))
        .route("/retry/failed", get(list_permanently_failed))

        // Todos
        .route("/todos", get(list_todos))
        .route("/todos/:id", patch(update_todo).delete(delete_todo))

        .with_state(state)
}

fn to_http(context: &str, e: JournalError) -> ApiError {
    let status = match &e {
        JournalError::NotFound { .. } => StatusCode::NOT_FOUND,
        e if e.is_client_error() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!("{}: {}", context, e);
    }
    (status, e.to_string())
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "service": "voice-journal",
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn get_stats(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let counts = state
        .store
        .database()
        .table_counts()
        .map_err(|e| to_http("Failed to count rows", e))?;
    Ok(Json(counts))
}

/// Classify a payload without persisting anything
async fn extract_preview(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .extractor
        .parse_and_extract(payload)
        .map_err(|e| to_http("Failed to extract segments", e))?;
    Ok(Json(result))
}

async fn ingest_log(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    let audio_path = payload
        .get("audio_path")
        .and_then(Value::as_str)
        .map(str::to_string);

    let result = state
        .extractor
        .parse_and_extract(payload)
        .map_err(|e| to_http("Failed to extract segments", e))?;

    let transcript = result.transcript.as_deref().ok_or_else(|| {
        to_http(
            "Missing transcript",
            JournalError::Validation("payload has no transcript".to_string()),
        )
    })?;

    info!(
        "Ingesting transcript with {} segments ({} skipped)",
        result.stats.total, result.skipped
    );

    let saved = state
        .store
        .save_analysis_result(transcript, &result.segments, audio_path.as_deref())
        .map_err(|e| to_http("Failed to save analysis", e))?;

    Ok((StatusCode::CREATED, Json(saved)))
}

#[derive(Debug, Deserialize)]
struct PendingLogRequest {
    transcript: String,
    audio_path: Option<String>,
}

async fn create_pending_log(
    State(state): State<AppState>,
    Json(request): Json<PendingLogRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let log = state
        .store
        .create_pending_log(&request.transcript, request.audio_path.as_deref())
        .map_err(|e| to_http("Failed to create pending log", e))?;
    Ok((StatusCode::CREATED, Json(log)))
}

async fn list_logs(
    State(state): State<AppState>,
    query: Option<Query<Pagination>>,
) -> Result<impl IntoResponse, ApiError> {
    let pagination = query.map(|q| q.0);
    let logs = state
        .store
        .get_all_logs_with_segments(pagination)
        .map_err(|e| to_http("Failed to list logs", e))?;

    Ok(Json(serde_json::json!({ "logs": logs })))
}

async fn get_log(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = LogId(id);
    let log = state
        .store
        .get_log_with_segments(&id)
        .map_err(|e| to_http("Failed to load log", e))?
        .ok_or_else(|| to_http("Failed to load log", JournalError::not_found("log", id.0.clone())))?;
    Ok(Json(log))
}

async fn delete_log(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .store
        .delete_log(&LogId(id))
        .map_err(|e| to_http("Failed to delete log", e))?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct SummaryRequest {
    summary: String,
}

async fn update_summary(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<SummaryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let log = state
        .store
        .update_log_summary(&LogId(id), &request.summary)
        .map_err(|e| to_http("Failed to update summary", e))?;
    Ok(Json(log))
}

fn enqueue(state: &AppState, outcome: AnalysisOutcome) -> Result<StatusCode, ApiError> {
    state.outcomes.send(outcome).map_err(|_| {
        error!("Analysis worker is not running");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            "analysis worker unavailable".to_string(),
        )
    })?;
    Ok(StatusCode::ACCEPTED)
}

/// Hand a classifier response to the worker; applied asynchronously
async fn submit_analysis(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    enqueue(
        &state,
        AnalysisOutcome::Completed {
            log_id: LogId(id),
            payload,
        },
    )
}

#[derive(Debug, Deserialize)]
struct FailureReport {
    error: String,
}

async fn report_failure(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(report): Json<FailureReport>,
) -> Result<impl IntoResponse, ApiError> {
    enqueue(
        &state,
        AnalysisOutcome::Failed {
            log_id: LogId(id),
            error: report.error,
        },
    )
}

async fn reset_retries(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let log = RetryLedger::new(state.store.database())
        .reset(&LogId(id))
        .map_err(|e| to_http("Failed to reset retries", e))?;
    Ok(Json(log))
}

async fn list_retry_candidates(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let logs = RetryLedger::new(state.store.database())
        .retry_candidates(&state.retry_policy)
        .map_err(|e| to_http("Failed to list retry candidates", e))?;
    Ok(Json(serde_json::json!({ "logs": logs })))
}

async fn list_permanently_failed(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let logs = RetryLedger::new(state.store.database())
        .permanently_failed(&state.retry_policy)
        .map_err(|e| to_http("Failed to list failed logs", e))?;
    Ok(Json(serde_json::json!({ "logs": logs })))
}

async fn list_todos(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let todos = state
        .store
        .database()
        .list_todos()
        .map_err(|e| to_http("Failed to list todos", e))?;
    Ok(Json(serde_json::json!({ "todos": todos })))
}

async fn update_todo(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<TodoUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let todo = state
        .store
        .database()
        .update_todo(&TodoId(id), &update)
        .map_err(|e| to_http("Failed to update todo", e))?;
    Ok(Json(todo))
}

async fn delete_todo(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .store
        .database()
        .delete_todo(&TodoId(id))
        .map_err(|e| to_http("Failed to delete todo", e))?;
    Ok(StatusCode::NO_CONTENT)
}
