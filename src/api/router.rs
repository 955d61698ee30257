use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::auth::require_auth;
use super::handlers;
use crate::AppState;

pub fn create_router(state: AppState) -> Router {
    // Public routes: no authentication required
    let public = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::metrics::render));

    // Protected API routes require a Bearer token when API_TOKEN is set
    let protected = Router::new()
        .route("/api/status", get(handlers::status::status))
        .route("/api/positions", get(handlers::positions::list))
        .route("/api/positions/:id", get(handlers::positions::detail))
        .route("/api/trades", get(handlers::trades::list))
        .route("/api/activity", get(handlers::activity::recent))
        .route("/api/ledger/snapshot", get(handlers::ledger::snapshot))
        // Control
        .route("/api/control/stop", post(handlers::control::stop))
        .route("/api/control/resume", post(handlers::control::resume))
        .route("/api/control/reset-daily-loss", post(handlers::control::reset_daily_loss))
        .route("/api/control/emergency-stop", post(handlers::control::emergency_stop))
        // WebSocket
        .route("/ws", get(handlers::ws::handler))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    public
        .merge(protected)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
