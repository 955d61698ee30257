use chrono::{DateTime, Utc};
use futures_util::future::join_all;

use crate::execution::engine::TradingContext;
use crate::execution::risk_manager::{forced_exit, PositionValuation};
use crate::models::{ExitReason, Opportunity, Position};
use crate::routing::RouteRequest;

/// Price every open position against its best exit route, record the value,
/// and return forced exits for those past a stop-loss or take-profit level.
pub async fn refresh_positions(ctx: &TradingContext, now: DateTime<Utc>) -> Vec<Opportunity> {
    let positions = ctx.ledger.open_positions();
    if positions.is_empty() {
        tracing::debug!("Position monitor: no open positions");
        return Vec::new();
    }

    let valuations = value_positions(ctx, positions).await;
    ctx.governor
        .evaluate_exits(&valuations, &ctx.quote_token, now, ctx.opportunity_ttl)
}

/// Forced exits for every open position regardless of thresholds.
pub async fn exit_opportunities(ctx: &TradingContext, reason: ExitReason, now: DateTime<Utc>) -> Vec<Opportunity> {
    let positions = ctx.ledger.open_positions();
    let total = positions.len();
    let valuations = value_positions(ctx, positions).await;
    if valuations.len() < total {
        ctx.activity.error(
            format!("{} open position(s) have no exit route", total - valuations.len()),
            None,
        );
    }
    valuations
        .iter()
        .map(|v| forced_exit(&v.position, &v.exit_route, &ctx.quote_token, reason, now, ctx.opportunity_ttl))
        .collect()
}

async fn value_positions(ctx: &TradingContext, positions: Vec<Position>) -> Vec<PositionValuation> {
    let routes = join_all(positions.iter().map(|p| {
        let request = RouteRequest::new(&p.holding.token, &ctx.quote_token.address, p.holding.raw);
        let router = ctx.router.clone();
        async move { router.find_best_route(&request).await }
    }))
    .await;

    let mut valuations = Vec::with_capacity(positions.len());
    for (position, route) in positions.into_iter().zip(routes) {
        match route {
            Ok(route) => {
                let value = route.net_out();
                let position = match ctx.ledger.update_valuation(position.id, value) {
                    Ok(updated) => updated,
                    Err(e) => {
                        // Closed since the list was taken.
                        tracing::debug!(position_id = %position.id, error = %e, "Skipping position valuation");
                        continue;
                    }
                };
                tracing::debug!(
                    position_id = %position.id,
                    value = %value,
                    unrealized_pnl = %position.unrealized_pnl(),
                    "Position valued"
                );
                valuations.push(PositionValuation {
                    position,
                    exit_route: route,
                });
            }
            Err(e) => {
                tracing::warn!(
                    position_id = %position.id,
                    token = %position.holding.token,
                    error = %e,
                    "No exit route for position"
                );
            }
        }
    }
    valuations
}
