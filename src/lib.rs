pub mod api;
pub mod config;
pub mod errors;
pub mod execution;
pub mod intelligence;
pub mod ledger;
pub mod metrics;
pub mod models;
pub mod routing;
pub mod services;
pub mod venues;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::execution::engine::TradingContext;

#[derive(Clone)]
pub struct AppState {
    pub ctx: TradingContext,
    pub config: AppConfig,
    pub metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
    /// Set by the control API; the engine skips cycles while it is true.
    pub pause_flag: Arc<AtomicBool>,
}
