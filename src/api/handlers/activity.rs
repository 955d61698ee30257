use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use super::ApiResponse;
use crate::models::ActivityEvent;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    pub limit: Option<usize>,
}

/// GET /api/activity: recent activity, oldest first.
pub async fn recent(
    State(state): State<AppState>,
    Query(query): Query<ActivityQuery>,
) -> Json<ApiResponse<Vec<ActivityEvent>>> {
    let limit = query.limit.unwrap_or(100);
    Json(ApiResponse::ok(state.ctx.activity.recent(limit)))
}
