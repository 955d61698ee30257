use std::sync::atomic::Ordering;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::execution::engine;
use crate::AppState;

/// POST /api/control/stop: Pause the trading engine.
pub async fn stop(State(state): State<AppState>) -> impl IntoResponse {
    state.pause_flag.store(true, Ordering::Relaxed);
    tracing::warn!("Trading engine PAUSED via control API");
    state.ctx.activity.warning("Trading paused by operator");
    (StatusCode::OK, Json(json!({ "status": "paused" })))
}

/// POST /api/control/resume: Resume the trading engine.
pub async fn resume(State(state): State<AppState>) -> impl IntoResponse {
    state.pause_flag.store(false, Ordering::Relaxed);
    tracing::info!("Trading engine RESUMED via control API");
    state.ctx.activity.info("Trading resumed by operator");
    (StatusCode::OK, Json(json!({ "status": "running" })))
}

/// POST /api/control/reset-daily-loss: Lift the daily-loss halt for the rest of the day.
pub async fn reset_daily_loss(State(state): State<AppState>) -> impl IntoResponse {
    let balance = state.ctx.ledger.reset_daily_loss();
    state.ctx.activity.warning("Daily loss counter reset by operator");
    state.ctx.persist();
    (
        StatusCode::OK,
        Json(json!({
            "status": "reset",
            "day_start_amount": balance.day_start_amount.to_string(),
            "halted": balance.halted,
        })),
    )
}

/// POST /api/control/emergency-stop: Pause and liquidate every open position.
pub async fn emergency_stop(State(state): State<AppState>) -> impl IntoResponse {
    let reports = engine::emergency_stop(&state.ctx, &state.pause_flag).await;
    let exits: Vec<_> = reports
        .iter()
        .map(|r| {
            json!({
                "opportunity_id": r.opportunity_id,
                "state": r.final_state,
                "trade_id": r.record.as_ref().map(|t| t.id),
                "error": r.error.as_ref().map(|e| e.to_string()),
            })
        })
        .collect();
    let remaining = state.ctx.ledger.open_positions().len();
    (
        StatusCode::OK,
        Json(json!({
            "status": "paused",
            "exits": exits,
            "open_positions": remaining,
        })),
    )
}
