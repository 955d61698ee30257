use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use super::ApiResponse;
use crate::models::TradeRecord;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct TradeQuery {
    pub limit: Option<usize>,
}

/// GET /api/trades: most recent records first.
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<TradeQuery>,
) -> Json<ApiResponse<Vec<TradeRecord>>> {
    let limit = query.limit.unwrap_or(50).min(1_000);
    Json(ApiResponse::ok(state.ctx.ledger.recent_trades(limit)))
}
