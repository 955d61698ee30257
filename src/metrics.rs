use anyhow::Context;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::models::token::display_value;
use crate::models::Balance;

/// Install the Prometheus exporter and register all application metrics.
/// Returns a `PrometheusHandle` whose `render()` method produces the
/// text/plain Prometheus scrape payload.
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus recorder")?;

    // Pre-register counters so they appear even before the first increment.
    counter!("opportunities_found_total").absolute(0);
    counter!("risk_rejections_total").absolute(0);
    counter!("trades_committed_total").absolute(0);
    counter!("trades_failed_total").absolute(0);
    counter!("trades_partial_total").absolute(0);
    counter!("forced_exits_total").absolute(0);

    gauge!("open_positions").set(0.0);
    gauge!("balance_current").set(0.0);
    gauge!("daily_pnl").set(0.0);

    // Histograms are lazily created on first record; force creation.
    histogram!("scan_cycle_seconds").record(0.0);
    histogram!("execution_latency_seconds").record(0.0);

    Ok(handle)
}

/// A handle that renders an empty registry, for callers that never install the
/// global recorder.
pub fn detached_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}

/// Publish the ledger's headline figures, in display units of the quote token.
pub fn record_balance(balance: &Balance, open_positions: usize) {
    let current = display_value(balance.current_amount, balance.quote_decimals);
    gauge!("balance_current").set(to_f64(current));

    let pnl = display_value(balance.daily_pnl.unsigned_abs(), balance.quote_decimals);
    let pnl = if balance.daily_pnl < 0 { -to_f64(pnl) } else { to_f64(pnl) };
    gauge!("daily_pnl").set(pnl);

    gauge!("open_positions").set(open_positions as f64);
}

fn to_f64(value: rust_decimal::Decimal) -> f64 {
    use rust_decimal::prelude::ToPrimitive;
    value.to_f64().unwrap_or(0.0)
}
