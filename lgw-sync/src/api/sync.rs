//! Run trigger and cancellation endpoints

use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::db::runs;
use crate::error::{ApiError, ApiResult};
use crate::models::{
    schedule::{MAX_LOOKBACK_DAYS, MIN_LOOKBACK_DAYS},
    RunStatus, SyncComponent, TriggerSource,
};
use crate::AppState;

/// POST /sync/start request
#[derive(Debug, Deserialize)]
pub struct StartSyncRequest {
    /// Days to look back for changed records (1–90)
    #[serde(default = "default_lookback")]
    pub lookback_days: u32,
    /// Components to synchronize; omit for all
    #[serde(default)]
    pub components: Vec<String>,
}

fn default_lookback() -> u32 {
    7
}

/// POST /sync/start response
#[derive(Debug, Serialize)]
pub struct StartSyncResponse {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

/// POST /sync/cancel/:run_id response
#[derive(Debug, Serialize)]
pub struct CancelSyncResponse {
    pub run_id: Uuid,
    pub cancel_requested: bool,
}

/// POST /sync/start
///
/// Begin a manual run. Returns the run id immediately; the run itself
/// executes in the background and is observable via /runs and /events.
pub async fn start_sync(
    State(state): State<AppState>,
    Json(request): Json<StartSyncRequest>,
) -> ApiResult<Json<StartSyncResponse>> {
    if request.lookback_days < MIN_LOOKBACK_DAYS || request.lookback_days > MAX_LOOKBACK_DAYS {
        return Err(ApiError::BadRequest(format!(
            "lookback_days must be between {} and {}",
            MIN_LOOKBACK_DAYS, MAX_LOOKBACK_DAYS
        )));
    }

    let components = request
        .components
        .iter()
        .map(|s| s.parse::<SyncComponent>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(ApiError::BadRequest)?;

    if runs::has_active_run(&state.db).await? {
        return Err(ApiError::Conflict(
            "A synchronization run is already active".to_string(),
        ));
    }

    let run = state
        .engine
        .prepare_run(TriggerSource::Manual, None, request.lookback_days, components)
        .await
        .map_err(|e| ApiError::Conflict(e.to_string()))?;

    let response = StartSyncResponse {
        run_id: run.run_id,
        status: run.status,
        started_at: run.started_at,
    };

    let cancel = CancellationToken::new();
    state
        .cancellation_tokens
        .write()
        .await
        .insert(run.run_id, cancel.clone());

    let engine = state.engine.clone();
    let tokens = state.cancellation_tokens.clone();
    let last_error = state.last_error.clone();
    tokio::spawn(async move {
        let run_id = run.run_id;
        if let Err(err) = engine.execute_prepared(run, cancel).await {
            tracing::error!(run_id = %run_id, error = %err, "Background run failed");
            *last_error.write().await = Some(err.to_string());
        }
        tokens.write().await.remove(&run_id);
    });

    Ok(Json(response))
}

/// POST /sync/cancel/:run_id
///
/// Request cancellation of an active run. The engine stops after finishing
/// or rolling back the current batch; committed batches stay committed.
pub async fn cancel_sync(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> ApiResult<Json<CancelSyncResponse>> {
    let requested = runs::request_cancel(&state.db, run_id).await?;
    if !requested {
        return Err(ApiError::NotFound(format!(
            "no active run with id {}",
            run_id
        )));
    }

    // Also wake the in-process run, if it lives in this process
    if let Some(token) = state.cancellation_tokens.read().await.get(&run_id) {
        token.cancel();
    }

    Ok(Json(CancelSyncResponse {
        run_id,
        cancel_requested: true,
    }))
}

/// Build sync trigger routes
pub fn sync_routes() -> Router<AppState> {
    Router::new()
        .route("/sync/start", post(start_sync))
        .route("/sync/cancel/:run_id", post(cancel_sync))
}
