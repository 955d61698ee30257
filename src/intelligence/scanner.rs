use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures_util::future::join_all;
use rust_decimal::Decimal;

use super::price_history::{PriceHistory, PriceSample};
use super::signals::{detect_momentum, detect_whale, Signal, SignalConfig};
use crate::models::math::{apply_bps, bps_of, mul_div, signed_diff};
use crate::models::opportunity::OpportunityDraft;
use crate::models::{Opportunity, OpportunityKind, Token, TokenPair};
use crate::routing::{Route, RouteError, RouteOptimizer, RouteRequest};

#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub quote_token: Token,
    pub tracked_tokens: Vec<Token>,
    pub enabled: HashSet<OpportunityKind>,
    /// Arbitrage must beat its input by more than this (quote base units).
    pub min_profit: u128,
    /// Largest probe size per cycle (quote base units).
    pub probe_amount: u128,
    pub max_position_bps: u32,
    pub history_len: usize,
    pub opportunity_ttl: Duration,
    pub signals: SignalConfig,
}

/// Result of probing one tracked token in both directions.
struct PairScan {
    token: Token,
    buy: Option<Route>,
    arbitrage: Option<Opportunity>,
}

/// Turns quotes into ranked candidate opportunities once per cycle.
/// Owns the per-pair price buffers; nothing else is carried between cycles.
pub struct OpportunityScanner {
    router: Arc<RouteOptimizer>,
    config: ScannerConfig,
    histories: HashMap<String, PriceHistory>,
}

impl OpportunityScanner {
    pub fn new(router: Arc<RouteOptimizer>, config: ScannerConfig) -> Self {
        Self {
            router,
            config,
            histories: HashMap::new(),
        }
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    pub fn history(&self, token_address: &str) -> Option<&PriceHistory> {
        self.histories.get(&token_address.to_lowercase())
    }

    pub fn probe_size(&self, available: u128) -> u128 {
        self.config
            .probe_amount
            .min(apply_bps(available, self.config.max_position_bps))
    }

    /// One scan cycle against the current market. Results are ranked by
    /// `expected_profit × confidence`, best first, ties broken by id.
    pub async fn scan(&mut self, available: u128, now: DateTime<Utc>) -> Vec<Opportunity> {
        let probe = self.probe_size(available);
        if probe == 0 {
            tracing::debug!(available = %available, "Scanner: nothing available to probe with");
            return Vec::new();
        }

        let scans = join_all(
            self.config
                .tracked_tokens
                .iter()
                .filter(|t| t.address != self.config.quote_token.address)
                .map(|token| self.scan_pair(token, probe, now)),
        )
        .await;

        let mut found = Vec::new();
        for scan in scans {
            if let Some(arb) = scan.arbitrage {
                found.push(arb);
            }
            if let Some(buy) = scan.buy {
                found.extend(self.signal_opportunities(&scan.token, &buy, probe, now));
            }
        }

        found.sort_by(|a, b| b.score().cmp(&a.score()).then_with(|| a.id.cmp(&b.id)));

        tracing::debug!(probe = %probe, found = found.len(), "Scan cycle complete");
        found
    }

    async fn scan_pair(&self, token: &Token, probe: u128, now: DateTime<Utc>) -> PairScan {
        let quote = &self.config.quote_token;
        let buy = match self
            .router
            .find_best_route(&RouteRequest::new(&quote.address, &token.address, probe))
            .await
        {
            Ok(route) => Some(route),
            Err(e) => {
                log_route_miss(token, "buy", &e);
                None
            }
        };

        let arbitrage = match &buy {
            Some(buy) if self.config.enabled.contains(&OpportunityKind::Arbitrage) => {
                self.find_arbitrage(token, buy, probe, now).await
            }
            _ => None,
        };

        PairScan {
            token: token.clone(),
            buy,
            arbitrage,
        }
    }

    async fn find_arbitrage(
        &self,
        token: &Token,
        buy: &Route,
        probe: u128,
        now: DateTime<Utc>,
    ) -> Option<Opportunity> {
        let quote = &self.config.quote_token;
        let threshold = probe.saturating_add(self.config.min_profit);
        let request = RouteRequest::new(&token.address, &quote.address, buy.amount_out)
            .with_min_net_out(threshold);
        let sell = match self.router.find_best_route(&request).await {
            Ok(route) => route,
            Err(e) => {
                log_route_miss(token, "sell", &e);
                return None;
            }
        };

        // Buy-side gas is denominated in the token; value it at the sell route's rate.
        let buy_gas_in_quote = mul_div(buy.gas_cost_out, sell.amount_out, sell.amount_in).unwrap_or(0);
        let profit = signed_diff(sell.net_out().saturating_sub(buy_gas_in_quote), probe);
        if profit <= i128::try_from(self.config.min_profit).unwrap_or(i128::MAX) {
            return None;
        }

        // Execution re-quotes both sides as one route under a single tolerance.
        let slippage_bps = buy.slippage_bps.saturating_add(sell.slippage_bps);
        let tolerance_bps = self.router.config().slippage_tolerance_bps;
        if slippage_bps > tolerance_bps {
            tracing::debug!(
                token = %token.symbol,
                slippage_bps = slippage_bps,
                tolerance_bps = tolerance_bps,
                "Arbitrage dropped, combined slippage over tolerance"
            );
            return None;
        }

        let margin_bps = bps_of(profit.unsigned_abs(), probe);
        let confidence = Decimal::from(margin_bps)
            / Decimal::from(margin_bps as u64 + slippage_bps as u64).max(Decimal::ONE);

        let mut legs = buy.to_legs();
        legs.extend(sell.to_legs());

        tracing::info!(
            token = %token.symbol,
            profit = %profit,
            margin_bps = margin_bps,
            buy_venue = %buy.legs[0].venue,
            sell_venue = %sell.legs[0].venue,
            "Arbitrage opportunity found"
        );

        Some(Opportunity::new(
            OpportunityDraft {
                kind: OpportunityKind::Arbitrage,
                pair: TokenPair::new(&quote.address, &token.address),
                legs,
                amount_in: quote.amount(probe),
                expected_out: quote.amount(sell.amount_out),
                expected_profit: profit,
                confidence,
                closes_position: None,
            },
            now,
            self.config.opportunity_ttl,
        ))
    }

    fn signal_opportunities(
        &mut self,
        token: &Token,
        buy: &Route,
        probe: u128,
        now: DateTime<Utc>,
    ) -> Vec<Opportunity> {
        let capacity = self.config.history_len;
        let history = self
            .histories
            .entry(token.address.clone())
            .or_insert_with(|| PriceHistory::new(capacity));
        history.push(PriceSample {
            probe_in: probe,
            amount_out: buy.amount_out,
            liquidity: buy.legs.first().and_then(|l| l.liquidity_in),
            observed_at: now,
        });

        let mut signals: Vec<(OpportunityKind, Signal)> = Vec::new();
        if self.config.enabled.contains(&OpportunityKind::Momentum) {
            if let Some(signal) = detect_momentum(history, &self.config.signals) {
                signals.push((OpportunityKind::Momentum, signal));
            }
        }
        if self.config.enabled.contains(&OpportunityKind::WhaleFollow) {
            if let Some(signal) = detect_whale(history, &self.config.signals) {
                signals.push((OpportunityKind::WhaleFollow, signal));
            }
        }

        let quote = &self.config.quote_token;
        signals
            .into_iter()
            .map(|(kind, signal)| {
                let expected_profit = apply_bps(probe, signal.expected_move_bps);
                tracing::info!(
                    token = %token.symbol,
                    kind = %kind,
                    expected_move_bps = signal.expected_move_bps,
                    confidence = %signal.confidence,
                    "Signal opportunity found"
                );
                Opportunity::new(
                    OpportunityDraft {
                        kind,
                        pair: TokenPair::new(&quote.address, &token.address),
                        legs: buy.to_legs(),
                        amount_in: quote.amount(probe),
                        expected_out: token.amount(buy.amount_out),
                        expected_profit: i128::try_from(expected_profit).unwrap_or(i128::MAX),
                        confidence: signal.confidence,
                        closes_position: None,
                    },
                    now,
                    self.config.opportunity_ttl,
                )
            })
            .collect()
    }
}

fn log_route_miss(token: &Token, side: &str, error: &RouteError) {
    match error {
        RouteError::NotFound { .. } => {
            tracing::debug!(token = %token.symbol, side, "No route clears thresholds")
        }
        other => tracing::warn!(token = %token.symbol, side, error = %other, "Route lookup failed"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
