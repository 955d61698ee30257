use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::AppState;

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    if state.ctx.ledger.is_consistent() {
        (
            StatusCode::OK,
            Json(json!({ "status": "healthy", "mode": state.ctx.mode })),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unhealthy", "ledger": "inconsistent" })),
        )
    }
}
