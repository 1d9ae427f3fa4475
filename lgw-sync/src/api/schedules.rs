//! Schedule inspection endpoints

use axum::{extract::State, routing::get, Json, Router};

use crate::db::schedules;
use crate::error::ApiResult;
use crate::models::ScheduleDefinition;
use crate::AppState;

/// GET /schedules
///
/// All schedule definitions with their last/next run linkage. Editing
/// schedules is operator tooling, not part of this service.
pub async fn list_schedules(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<ScheduleDefinition>>> {
    Ok(Json(schedules::list_schedules(&state.db).await?))
}

/// Build schedule routes
pub fn schedule_routes() -> Router<AppState> {
    Router::new().route("/schedules", get(list_schedules))
}
