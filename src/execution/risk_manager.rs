use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::position_sizer::{calculate_size, SizingStrategy};
use crate::ledger::Ledger;
use crate::models::amount_serde::u128_string;
use crate::models::math::{apply_bps, bps_of, signed_diff};
use crate::models::opportunity::OpportunityDraft;
use crate::models::{ExitReason, Opportunity, OpportunityKind, Position, Token};
use crate::routing::Route;

/// Configurable risk limits. Percentages are held in basis points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskLimits {
    /// Max single trade as a share of the current balance (default 5%).
    pub max_position_bps: u32,
    /// Exit when a position is worth this much less than it cost (default 5%).
    pub stop_loss_bps: u32,
    /// Exit when a position is worth this much more than it cost (default 10%).
    pub take_profit_bps: u32,
    /// Halt for the day once realized losses reach this share of the day's start balance (default 10%).
    pub daily_loss_limit_bps: u32,
    /// Max adverse move between scan-time and execution-time quotes (default 1%).
    pub slippage_tolerance_bps: u32,
    /// Smallest trade worth executing, quote base units (default 1 USDC).
    #[serde(with = "u128_string")]
    pub min_trade_size: u128,
    /// Open positions allowed per token pair (default 1).
    pub max_positions_per_pair: usize,
    pub sizing: SizingStrategy,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_position_bps: 500,
            stop_loss_bps: 500,
            take_profit_bps: 1_000,
            daily_loss_limit_bps: 1_000,
            slippage_tolerance_bps: 100,
            min_trade_size: 1_000_000,
            max_positions_per_pair: 1,
            sizing: SizingStrategy::Full,
        }
    }
}

impl RiskLimits {
    /// `(stop_loss_value, take_profit_value)` for a position with this cost basis.
    pub fn exit_thresholds(&self, cost_basis: u128) -> (u128, u128) {
        (
            cost_basis - apply_bps(cost_basis, self.stop_loss_bps.min(10_000)),
            cost_basis.saturating_add(apply_bps(cost_basis, self.take_profit_bps)),
        )
    }
}

/// Risk check violation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RiskViolation {
    #[error("daily loss limit reached: PnL {pnl}, limit -{limit}")]
    DailyLossExceeded { pnl: i128, limit: u128 },

    #[error("trade size {size} below minimum {min}")]
    BelowMinimumSize { size: u128, min: u128 },

    #[error("size cap shrank to {allowed} below approved {approved}")]
    SizeCapShrank { approved: u128, allowed: u128 },

    #[error("too many open positions in {pair}: {current}/{max}")]
    ExposureLimit { pair: String, current: usize, max: usize },

    #[error("opportunity {0} expired")]
    Expired(Uuid),

    #[error("slippage too high: {actual_bps} bps > max {max_bps} bps")]
    SlippageTooHigh { actual_bps: u32, max_bps: u32 },

    #[error("no longer profitable: expected profit {expected}")]
    Unprofitable { expected: i128 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    Approved { amount: u128 },
    Rejected(RiskViolation),
}

impl Authorization {
    pub fn is_approved(&self) -> bool {
        matches!(self, Authorization::Approved { .. })
    }

    pub fn approved_amount(&self) -> Option<u128> {
        match self {
            Authorization::Approved { amount } => Some(*amount),
            Authorization::Rejected(_) => None,
        }
    }
}

/// An open position priced against its best exit route.
#[derive(Debug, Clone)]
pub struct PositionValuation {
    pub position: Position,
    pub exit_route: Route,
}

impl PositionValuation {
    pub fn value(&self) -> u128 {
        self.exit_route.net_out()
    }
}

/// Applies the configured limits to every opportunity. Its state (daily PnL,
/// open positions) lives in the ledger, so every decision reads the latest
/// applied records.
#[derive(Debug, Clone)]
pub struct RiskGovernor {
    limits: RiskLimits,
}

impl RiskGovernor {
    pub fn new(limits: RiskLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    pub fn authorize(&self, opportunity: &Opportunity, ledger: &Ledger) -> Authorization {
        self.authorize_at(opportunity, ledger, Utc::now())
    }

    /// Checks in order, first failure wins: freshness, daily loss, size cap, exposure.
    /// Forced exits reduce risk and skip all of them.
    pub fn authorize_at(&self, opportunity: &Opportunity, ledger: &Ledger, now: DateTime<Utc>) -> Authorization {
        if opportunity.kind == OpportunityKind::ForcedExit {
            return Authorization::Approved {
                amount: opportunity.amount_in.raw,
            };
        }

        match self.check(opportunity, ledger, now) {
            Ok(amount) => Authorization::Approved { amount },
            Err(violation) => {
                tracing::debug!(
                    opportunity_id = %opportunity.id,
                    kind = %opportunity.kind,
                    reason = %violation,
                    "Risk governor rejected opportunity"
                );
                Authorization::Rejected(violation)
            }
        }
    }

    fn check(&self, opportunity: &Opportunity, ledger: &Ledger, now: DateTime<Utc>) -> Result<u128, RiskViolation> {
        if opportunity.is_expired(now) {
            return Err(RiskViolation::Expired(opportunity.id));
        }

        // 1. Daily loss
        let balance = ledger.balance_at(now);
        if balance.is_halted() {
            return Err(RiskViolation::DailyLossExceeded {
                pnl: balance.daily_pnl,
                limit: balance.daily_loss_limit(),
            });
        }

        // 2. Size cap
        let decision = calculate_size(
            self.limits.sizing,
            opportunity.amount_in.raw,
            opportunity.confidence,
            balance.current_amount,
            self.limits.max_position_bps,
        );
        if decision.sized < self.limits.min_trade_size || decision.sized == 0 {
            return Err(RiskViolation::BelowMinimumSize {
                size: decision.sized,
                min: self.limits.min_trade_size,
            });
        }
        if decision.was_clamped() {
            tracing::debug!(
                opportunity_id = %opportunity.id,
                requested = %decision.requested,
                sized = %decision.sized,
                "Opportunity size clamped to position cap"
            );
        }

        // 3. Exposure
        if opportunity.kind.opens_position() {
            let current = ledger.open_positions_in_pair(&opportunity.pair);
            if current + 1 > self.limits.max_positions_per_pair {
                return Err(RiskViolation::ExposureLimit {
                    pair: opportunity.pair.to_string(),
                    current,
                    max: self.limits.max_positions_per_pair,
                });
            }
        }

        Ok(decision.sized)
    }

    /// Forced exits for every open position whose value crossed a threshold.
    pub fn evaluate_exits(
        &self,
        valuations: &[PositionValuation],
        quote: &Token,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Vec<Opportunity> {
        valuations
            .iter()
            .filter(|v| v.position.is_open())
            .filter_map(|v| {
                let value = v.value();
                let reason = v.position.exit_trigger(value)?;
                tracing::info!(
                    position_id = %v.position.id,
                    value = %value,
                    cost_basis = %v.position.cost_basis,
                    reason = reason.as_str(),
                    "Exit threshold crossed"
                );
                Some(forced_exit(&v.position, &v.exit_route, quote, reason, now, ttl))
            })
            .collect()
    }
}

/// Liquidate `position` along `route` back into the quote token.
pub fn forced_exit(
    position: &Position,
    route: &Route,
    quote: &Token,
    reason: ExitReason,
    now: DateTime<Utc>,
    ttl: Duration,
) -> Opportunity {
    Opportunity::new(
        OpportunityDraft {
            kind: OpportunityKind::ForcedExit,
            pair: position.pair.clone(),
            legs: route.to_legs(),
            amount_in: position.holding.clone(),
            expected_out: quote.amount(route.amount_out),
            expected_profit: signed_diff(route.net_out(), position.cost_basis),
            confidence: Decimal::ONE,
            closes_position: Some(position.id),
        },
        now,
        ttl,
    )
    .with_exit_reason(reason)
}

/// Adverse deviation of `actual_out` from `expected_out`, in bps. A better
/// fill than expected is never a violation.
pub fn check_slippage(expected_out: u128, actual_out: u128, limits: &RiskLimits) -> Result<u32, RiskViolation> {
    if expected_out == 0 || actual_out >= expected_out {
        return Ok(0);
    }
    let slippage = bps_of(expected_out - actual_out, expected_out);
    if slippage > limits.slippage_tolerance_bps {
        return Err(RiskViolation::SlippageTooHigh {
            actual_bps: slippage,
            max_bps: limits.slippage_tolerance_bps,
        });
    }
    Ok(slippage)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Leg, TokenAmount, TokenPair, TradeOutcome, TradeRecord, TradingMode, VenueId};
    use crate::routing::RouteLeg;

    const USDC: u128 = 1_000_000;

    fn quote() -> Token {
        Token::new("USDC", "0xq", 6)
    }

    fn ledger() -> Ledger {
        Ledger::new(TradingMode::Simulation, &quote(), 10_000 * USDC, 1_000)
    }

    fn opportunity(kind: OpportunityKind, amount: u128) -> Opportunity {
        Opportunity::new(
            OpportunityDraft {
                kind,
                pair: TokenPair::new("0xq", "0xt"),
                legs: vec![Leg {
                    venue: VenueId::new("alpha"),
                    token_in: "0xq".into(),
                    token_out: "0xt".into(),
                }],
                amount_in: quote().amount(amount),
                expected_out: TokenAmount::new("0xt", amount, 18),
                expected_profit: 50 * USDC as i128,
                confidence: Decimal::new(9, 1),
                closes_position: None,
            },
            Utc::now(),
            Duration::seconds(5),
        )
    }

    fn loss(amount: u128) -> TradeRecord {
        TradeRecord {
            id: Uuid::new_v4(),
            opportunity_id: None,
            mode: TradingMode::Simulation,
            kind: Some(OpportunityKind::Arbitrage),
            legs: Vec::new(),
            amount_in: quote().amount(0),
            amount_out: quote().amount(0),
            fees_paid: 0,
            net_result: -(amount as i128),
            realized_pnl: -(amount as i128),
            outcome: TradeOutcome::Success,
            timestamp: Utc::now(),
            note: None,
        }
    }

    fn route_worth(value: u128) -> Route {
        Route {
            legs: vec![RouteLeg {
                venue: VenueId::new("alpha"),
                token_in: "0xt".into(),
                token_out: "0xq".into(),
                amount_in: 1,
                amount_out: value,
                min_acceptable_amount_out: value,
                fee_bps: 30,
                slippage_bps: 30,
                liquidity_in: None,
                gas_estimate_out: 0,
            }],
            amount_in: 1,
            amount_out: value,
            min_acceptable_amount_out: value,
            gas_cost_out: 0,
            slippage_bps: 30,
            venue_priority: 0,
        }
    }

    #[test]
    fn test_approves_within_limits() {
        let governor = RiskGovernor::new(RiskLimits::default());
        let auth = governor.authorize(&opportunity(OpportunityKind::Arbitrage, 200 * USDC), &ledger());
        assert_eq!(auth, Authorization::Approved { amount: 200 * USDC });
    }

    #[test]
    fn test_clamps_to_position_cap() {
        let governor = RiskGovernor::new(RiskLimits::default());
        let auth = governor.authorize(&opportunity(OpportunityKind::Arbitrage, 800 * USDC), &ledger());
        assert_eq!(auth.approved_amount(), Some(500 * USDC));
    }

    #[test]
    fn test_below_minimum_size() {
        let limits = RiskLimits {
            min_trade_size: 600 * USDC,
            ..RiskLimits::default()
        };
        let governor = RiskGovernor::new(limits);
        let auth = governor.authorize(&opportunity(OpportunityKind::Arbitrage, 800 * USDC), &ledger());
        assert!(matches!(
            auth,
            Authorization::Rejected(RiskViolation::BelowMinimumSize { size, .. }) if size == 500 * USDC
        ));
    }

    #[test]
    fn test_daily_loss_blocks_everything_but_exits() {
        let governor = RiskGovernor::new(RiskLimits::default());
        let ledger = ledger();
        ledger.apply_trade(loss(1_000 * USDC)).unwrap();

        let auth = governor.authorize(&opportunity(OpportunityKind::Arbitrage, 10 * USDC), &ledger);
        assert!(matches!(auth, Authorization::Rejected(RiskViolation::DailyLossExceeded { .. })));

        let exit = opportunity(OpportunityKind::ForcedExit, 10 * USDC);
        assert!(governor.authorize(&exit, &ledger).is_approved());
    }

    #[test]
    fn test_exposure_limit_per_pair() {
        let governor = RiskGovernor::new(RiskLimits::default());
        let ledger = ledger();
        let mut open = loss(100 * USDC);
        open.realized_pnl = 0;
        ledger
            .open_position(
                open,
                crate::ledger::NewPosition {
                    pair: TokenPair::new("0xq", "0xt"),
                    holding: TokenAmount::new("0xt", 1, 18),
                    cost_basis: 100 * USDC,
                    stop_loss_value: 95 * USDC,
                    take_profit_value: 110 * USDC,
                },
            )
            .unwrap();

        let auth = governor.authorize(&opportunity(OpportunityKind::Momentum, 100 * USDC), &ledger);
        assert!(matches!(auth, Authorization::Rejected(RiskViolation::ExposureLimit { .. })));

        // Arbitrage ends in the quote token and is not an exposure
        let auth = governor.authorize(&opportunity(OpportunityKind::Arbitrage, 100 * USDC), &ledger);
        assert!(auth.is_approved());
    }

    #[test]
    fn test_expired_opportunity() {
        let governor = RiskGovernor::new(RiskLimits::default());
        let opp = opportunity(OpportunityKind::Arbitrage, 100 * USDC);
        let auth = governor.authorize_at(&opp, &ledger(), opp.expires_at);
        assert_eq!(auth, Authorization::Rejected(RiskViolation::Expired(opp.id)));
    }

    #[test]
    fn test_exit_thresholds() {
        let (sl, tp) = RiskLimits::default().exit_thresholds(500 * USDC);
        assert_eq!(sl, 475 * USDC);
        assert_eq!(tp, 550 * USDC);
    }

    #[test]
    fn test_evaluate_exits() {
        let governor = RiskGovernor::new(RiskLimits::default());
        let ledger = ledger();
        let mut open = loss(500 * USDC);
        open.realized_pnl = 0;
        let (sl, tp) = governor.limits().exit_thresholds(500 * USDC);
        let position = ledger
            .open_position(
                open,
                crate::ledger::NewPosition {
                    pair: TokenPair::new("0xq", "0xt"),
                    holding: TokenAmount::new("0xt", 10, 18),
                    cost_basis: 500 * USDC,
                    stop_loss_value: sl,
                    take_profit_value: tp,
                },
            )
            .unwrap();

        let now = Utc::now();
        let hold = [PositionValuation { position: position.clone(), exit_route: route_worth(510 * USDC) }];
        assert!(governor.evaluate_exits(&hold, &quote(), now, Duration::seconds(5)).is_empty());

        let crash = [PositionValuation { position: position.clone(), exit_route: route_worth(470 * USDC) }];
        let exits = governor.evaluate_exits(&crash, &quote(), now, Duration::seconds(5));
        assert_eq!(exits.len(), 1);
        assert_eq!(exits[0].kind, OpportunityKind::ForcedExit);
        assert_eq!(exits[0].closes_position, Some(position.id));
        assert_eq!(exits[0].exit_reason, Some(ExitReason::StopLoss));
        assert_eq!(exits[0].expected_profit, -(30 * USDC as i128));
    }

    #[test]
    fn test_slippage_ok() {
        let limits = RiskLimits::default();
        assert_eq!(check_slippage(1_000_000, 995_000, &limits), Ok(50));
        assert_eq!(check_slippage(1_000_000, 1_100_000, &limits), Ok(0));
    }

    #[test]
    fn test_slippage_too_high() {
        let result = check_slippage(1_000_000, 980_000, &RiskLimits::default());
        assert!(matches!(result, Err(RiskViolation::SlippageTooHigh { actual_bps: 200, .. })));
    }
}
