//! Run Ledger endpoints
//!
//! Queryable history of runs with metrics, validation reports, and the
//! record-level error log, consumable by any operator-facing dashboard.

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{errors, runs};
use crate::error::{ApiError, ApiResult};
use crate::models::{RunStatus, SyncRun, TriggerSource, ValidationReport};
use crate::AppState;

/// GET /runs query parameters
#[derive(Debug, Default, Deserialize)]
pub struct RunHistoryQuery {
    pub status: Option<String>,
    pub trigger: Option<String>,
    pub limit: Option<u32>,
}

/// One record-level error entry
#[derive(Debug, Serialize)]
pub struct RunErrorResponse {
    pub component: String,
    pub natural_key: Option<String>,
    pub error_type: String,
    pub message: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// GET /runs
pub async fn run_history(
    State(state): State<AppState>,
    Query(query): Query<RunHistoryQuery>,
) -> ApiResult<Json<Vec<SyncRun>>> {
    let status = query
        .status
        .as_deref()
        .map(parse_status)
        .transpose()
        .map_err(ApiError::BadRequest)?;
    let trigger_source = query
        .trigger
        .as_deref()
        .map(parse_trigger)
        .transpose()
        .map_err(ApiError::BadRequest)?;

    let filter = runs::RunFilter {
        status,
        trigger_source,
        limit: query.limit,
    };

    Ok(Json(runs::run_history(&state.db, &filter).await?))
}

/// GET /runs/:run_id
pub async fn run_detail(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> ApiResult<Json<SyncRun>> {
    runs::get_run(&state.db, run_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("run {}", run_id)))
}

/// GET /runs/:run_id/validation
pub async fn run_validation(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> ApiResult<Json<ValidationReport>> {
    runs::get_validation_report(&state.db, run_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no validation report for run {}", run_id)))
}

/// GET /runs/:run_id/errors
pub async fn run_errors(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> ApiResult<Json<Vec<RunErrorResponse>>> {
    let entries = errors::errors_for_run(&state.db, run_id).await?;

    Ok(Json(
        entries
            .into_iter()
            .map(|e| RunErrorResponse {
                component: e.component.as_str().to_string(),
                natural_key: e.natural_key,
                error_type: e.error_type,
                message: e.message,
                created_at: e.created_at,
            })
            .collect(),
    ))
}

fn parse_status(value: &str) -> Result<RunStatus, String> {
    match value {
        "running" => Ok(RunStatus::Running),
        "completed" => Ok(RunStatus::Completed),
        "partial" => Ok(RunStatus::Partial),
        "failed" => Ok(RunStatus::Failed),
        "cancelled" => Ok(RunStatus::Cancelled),
        other => Err(format!("unknown run status: {}", other)),
    }
}

fn parse_trigger(value: &str) -> Result<TriggerSource, String> {
    match value {
        "manual" => Ok(TriggerSource::Manual),
        "scheduled" => Ok(TriggerSource::Scheduled),
        "test" => Ok(TriggerSource::Test),
        other => Err(format!("unknown trigger source: {}", other)),
    }
}

/// Build run ledger routes
pub fn run_routes() -> Router<AppState> {
    Router::new()
        .route("/runs", get(run_history))
        .route("/runs/:run_id", get(run_detail))
        .route("/runs/:run_id/validation", get(run_validation))
        .route("/runs/:run_id/errors", get(run_errors))
}
