use axum::extract::State;
use axum::Json;

use crate::ledger::LedgerSnapshot;
use crate::AppState;

/// GET /api/ledger/snapshot: the same document the store persists.
pub async fn snapshot(State(state): State<AppState>) -> Json<LedgerSnapshot> {
    Json(state.ctx.ledger.snapshot())
}
