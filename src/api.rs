use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use shuttle_axum::axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use crate::ingest::repository::Repository;
use crate::ingest::scheduler::{Scheduler, TriggerError, TriggerKind};
use crate::ingest::types::{Category, PersistedRecord, RunLog};
use crate::ingest::IngestError;

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repository>,
    pub scheduler: Scheduler,
}

impl AppState {
    pub fn new(scheduler: Scheduler) -> Self {
        Self {
            repo: scheduler.coordinator().repository(),
            scheduler,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/records", get(list_records))
        .route("/runs", get(list_runs))
        // GET takes a run id, POST a category name.
        .route("/runs/{key}", get(get_run).post(trigger_run))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// JSON error body with a status code.
struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "error": self.1 }))).into_response()
    }
}

impl From<IngestError> for ApiError {
    fn from(e: IngestError) -> Self {
        let status = match e {
            IngestError::Configuration(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError(status, e.to_string())
    }
}

fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT)
}

#[derive(Deserialize)]
struct RecordsQuery {
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Serialize)]
struct RecordsOut {
    records: Vec<PersistedRecord>,
}

async fn list_records(
    State(state): State<AppState>,
    Query(q): Query<RecordsQuery>,
) -> Result<Json<RecordsOut>, ApiError> {
    let category = q
        .category
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(str::parse::<Category>)
        .transpose()?;
    let records = state.repo.records(category, clamp_limit(q.limit)).await?;
    Ok(Json(RecordsOut { records }))
}

#[derive(Deserialize)]
struct RunsQuery {
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Serialize)]
struct RunsOut {
    runs: Vec<RunLog>,
}

async fn list_runs(
    State(state): State<AppState>,
    Query(q): Query<RunsQuery>,
) -> Result<Json<RunsOut>, ApiError> {
    let runs = state.repo.run_logs(clamp_limit(q.limit)).await?;
    Ok(Json(RunsOut { runs }))
}

async fn get_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<RunLog>, ApiError> {
    let id = Uuid::parse_str(&run_id)
        .map_err(|_| ApiError(StatusCode::BAD_REQUEST, format!("invalid run id '{run_id}'")))?;
    match state.repo.run_log(id).await? {
        Some(log) => Ok(Json(log)),
        None => Err(ApiError(StatusCode::NOT_FOUND, format!("run {id} not found"))),
    }
}

#[derive(Serialize)]
struct TriggerOut {
    records: Vec<PersistedRecord>,
    run: RunLog,
}

/// Manual trigger. Blocks until the run finishes and returns the records it
/// touched.
async fn trigger_run(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> Result<Json<TriggerOut>, ApiError> {
    let category: Category = category.parse()?;
    let run = match state.scheduler.trigger(category, TriggerKind::Manual).await {
        Ok(run) => run,
        Err(e @ TriggerError::AlreadyRunning(_)) => {
            return Err(ApiError(StatusCode::CONFLICT, e.to_string()))
        }
        Err(e) => return Err(ApiError(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    };

    let records = state
        .repo
        .records(Some(category), usize::MAX)
        .await?
        .into_iter()
        .filter(|r| r.last_seen_at >= run.start_time)
        .collect();
    Ok(Json(TriggerOut { records, run }))
}
