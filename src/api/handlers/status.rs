use std::sync::atomic::Ordering;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use super::ApiResponse;
use crate::ledger::PerformanceSummary;
use crate::models::amount_serde::u128_string;
use crate::models::{Balance, TradingMode};
use crate::AppState;

#[derive(Serialize)]
pub struct StatusView {
    pub mode: TradingMode,
    pub paused: bool,
    pub halted: bool,
    pub balance: Balance,
    #[serde(with = "u128_string")]
    pub daily_loss_limit_remaining: u128,
    pub open_positions: usize,
    pub executions_in_flight: usize,
    pub performance: PerformanceSummary,
}

/// GET /api/status: balance, halt state and performance of the running mode.
pub async fn status(State(state): State<AppState>) -> Json<ApiResponse<StatusView>> {
    let ledger = &state.ctx.ledger;
    let balance = ledger.balance();
    Json(ApiResponse::ok(StatusView {
        mode: state.ctx.mode,
        paused: state.pause_flag.load(Ordering::Relaxed),
        halted: balance.is_halted(),
        daily_loss_limit_remaining: balance.daily_loss_limit_remaining(),
        balance,
        open_positions: ledger.open_positions().len(),
        executions_in_flight: state.ctx.in_flight.len(),
        performance: ledger.performance(),
    }))
}
