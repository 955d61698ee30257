use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use super::ApiResponse;
use crate::errors::AppError;
use crate::models::Position;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct PositionQuery {
    /// `open` (default), `closed` or `all`.
    pub status: Option<String>,
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<PositionQuery>,
) -> Result<Json<ApiResponse<Vec<Position>>>, AppError> {
    let ledger = &state.ctx.ledger;
    let positions = match query.status.as_deref().unwrap_or("open") {
        "open" => ledger.open_positions(),
        "closed" => ledger.positions().into_iter().filter(|p| !p.is_open()).collect(),
        "all" => ledger.positions(),
        other => return Err(AppError::BadRequest(format!("unknown status filter '{other}'"))),
    };
    Ok(Json(ApiResponse::ok(positions)))
}

pub async fn detail(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Position>>, AppError> {
    let position = state
        .ctx
        .ledger
        .position(id)
        .ok_or_else(|| AppError::NotFound(format!("position {id}")))?;
    Ok(Json(ApiResponse::ok(position)))
}
