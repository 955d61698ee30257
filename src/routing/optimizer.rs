use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures_util::future::join_all;
use thiserror::Error;

use crate::models::math::{apply_bps, mul_div, BPS_DENOMINATOR};
use crate::models::{Leg, Quote, VenueId};
use crate::venues::{QuoteError, QuoteSource};

/// Per-leg expected slippage is clamped into this band (bps).
pub const MIN_LEG_SLIPPAGE_BPS: u32 = 30;
pub const MAX_LEG_SLIPPAGE_BPS: u32 = 800;

#[derive(Debug, Clone)]
pub struct RoutingConfig {
    /// Largest `(amount_out - min_acceptable_amount_out) / amount_out` a route may carry.
    pub slippage_tolerance_bps: u32,
    pub base_slippage_bps: u32,
    /// Direct quotes with more impact than this also get two-hop alternatives.
    pub two_hop_impact_bps: u32,
    pub intermediates: Vec<String>,
    pub quote_freshness: Duration,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            slippage_tolerance_bps: 100,
            base_slippage_bps: 10,
            two_hop_impact_bps: 100,
            intermediates: Vec::new(),
            quote_freshness: Duration::seconds(3),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("no route from {token_in} to {token_out} clears the slippage and profit thresholds")]
    NotFound { token_in: String, token_out: String },

    #[error("quote unavailable: {0}")]
    QuoteUnavailable(#[from] QuoteError),

    #[error("route slippage {actual_bps} bps exceeds tolerance {max_bps} bps")]
    SlippageExceeded { actual_bps: u32, max_bps: u32 },

    #[error("venue {0} is not configured")]
    UnknownVenue(VenueId),
}

#[derive(Debug, Clone)]
pub struct RouteRequest {
    pub token_in: String,
    pub token_out: String,
    pub amount_in: u128,
    /// Minimum acceptable `net_out`; the caller's profit threshold.
    pub min_net_out: u128,
    /// Restrict to these venues; `None` means every configured venue.
    pub venues: Option<Vec<VenueId>>,
}

impl RouteRequest {
    pub fn new(token_in: &str, token_out: &str, amount_in: u128) -> Self {
        Self {
            token_in: token_in.to_lowercase(),
            token_out: token_out.to_lowercase(),
            amount_in,
            min_net_out: 0,
            venues: None,
        }
    }

    pub fn with_min_net_out(mut self, min_net_out: u128) -> Self {
        self.min_net_out = min_net_out;
        self
    }

    pub fn on_venues(mut self, venues: Vec<VenueId>) -> Self {
        self.venues = Some(venues);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteLeg {
    pub venue: VenueId,
    pub token_in: String,
    pub token_out: String,
    pub amount_in: u128,
    pub amount_out: u128,
    pub min_acceptable_amount_out: u128,
    pub fee_bps: u32,
    pub slippage_bps: u32,
    pub liquidity_in: Option<u128>,
    pub gas_estimate_out: u128,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub legs: Vec<RouteLeg>,
    pub amount_in: u128,
    pub amount_out: u128,
    pub min_acceptable_amount_out: u128,
    /// Total gas of all legs, in output-token base units.
    pub gas_cost_out: u128,
    pub slippage_bps: u32,
    /// Position of the venue in configuration order; lower wins ties.
    pub venue_priority: usize,
}

impl Route {
    pub fn net_out(&self) -> u128 {
        self.amount_out.saturating_sub(self.gas_cost_out)
    }

    pub fn hops(&self) -> usize {
        self.legs.len()
    }

    pub fn to_legs(&self) -> Vec<Leg> {
        self.legs
            .iter()
            .map(|l| Leg {
                venue: l.venue.clone(),
                token_in: l.token_in.clone(),
                token_out: l.token_out.clone(),
            })
            .collect()
    }

    /// Implied slippage of the route as quoted.
    pub fn implied_slippage_bps(&self) -> u32 {
        if self.amount_out == 0 {
            return 0;
        }
        let gap = self.amount_out - self.min_acceptable_amount_out;
        // Round up so the reported figure never understates the protection gap.
        let scaled = mul_div(gap, BPS_DENOMINATOR as u128, self.amount_out).unwrap_or(u128::MAX);
        let exact = mul_div(scaled, self.amount_out, BPS_DENOMINATOR as u128) == Some(gap);
        let bps = if exact { scaled } else { scaled.saturating_add(1) };
        u32::try_from(bps).unwrap_or(u32::MAX)
    }
}

/// `base + 1.5 × impact`, clamped into the per-leg band.
pub fn expected_slippage_bps(base_bps: u32, impact_bps: u32) -> u32 {
    let impact_term = (impact_bps as u64 * 3 / 2).min(u32::MAX as u64) as u32;
    base_bps
        .saturating_add(impact_term)
        .clamp(MIN_LEG_SLIPPAGE_BPS, MAX_LEG_SLIPPAGE_BPS)
}

pub fn min_acceptable_amount_out(amount_out: u128, slippage_bps: u32) -> u128 {
    amount_out - apply_bps(amount_out, slippage_bps.min(BPS_DENOMINATOR))
}

/// Finds and ranks routes across every configured venue.
pub struct RouteOptimizer {
    venues: Vec<Arc<dyn QuoteSource>>,
    config: RoutingConfig,
}

impl RouteOptimizer {
    pub fn new(venues: Vec<Arc<dyn QuoteSource>>, config: RoutingConfig) -> Self {
        Self { venues, config }
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    pub fn venue_ids(&self) -> Vec<VenueId> {
        self.venues.iter().map(|v| v.venue().clone()).collect()
    }

    pub async fn find_best_route(&self, request: &RouteRequest) -> Result<Route, RouteError> {
        let not_found = || RouteError::NotFound {
            token_in: request.token_in.clone(),
            token_out: request.token_out.clone(),
        };
        if request.amount_in == 0 || request.token_in == request.token_out {
            return Err(not_found());
        }

        let now = Utc::now();
        let lookups = self
            .venues
            .iter()
            .enumerate()
            .filter(|(_, v)| match &request.venues {
                Some(allowed) => allowed.contains(v.venue()),
                None => true,
            })
            .map(|(priority, venue)| self.venue_candidates(priority, venue, request, now));

        let mut candidates: Vec<Route> = join_all(lookups).await.into_iter().flatten().collect();
        let total = candidates.len();

        candidates.retain(|route| {
            route.slippage_bps <= self.config.slippage_tolerance_bps
                && route.net_out() > 0
                && route.net_out() >= request.min_net_out
        });
        candidates.sort_by(rank_routes);

        tracing::debug!(
            token_in = %request.token_in,
            token_out = %request.token_out,
            amount_in = %request.amount_in,
            candidates = total,
            eligible = candidates.len(),
            "Route search complete"
        );

        candidates.into_iter().next().ok_or_else(not_found)
    }

    /// Re-quote a fixed leg sequence, chaining each leg's output into the next.
    pub async fn requote(&self, legs: &[Leg], amount_in: u128) -> Result<Route, RouteError> {
        let now = Utc::now();
        let mut quotes = Vec::with_capacity(legs.len());
        let mut amount = amount_in;
        let mut priority = 0;

        for (idx, leg) in legs.iter().enumerate() {
            let (venue_priority, venue) = self
                .venues
                .iter()
                .enumerate()
                .find(|(_, v)| v.venue() == &leg.venue)
                .ok_or_else(|| RouteError::UnknownVenue(leg.venue.clone()))?;
            if idx == 0 {
                priority = venue_priority;
            }
            let quote = self
                .fetch_quote(venue, &leg.token_in, &leg.token_out, amount, now)
                .await?;
            amount = quote.amount_out;
            quotes.push(quote);
        }

        let route = self.build_route(priority, quotes);
        if route.slippage_bps > self.config.slippage_tolerance_bps {
            return Err(RouteError::SlippageExceeded {
                actual_bps: route.slippage_bps,
                max_bps: self.config.slippage_tolerance_bps,
            });
        }
        Ok(route)
    }

    async fn venue_candidates(
        &self,
        priority: usize,
        venue: &Arc<dyn QuoteSource>,
        request: &RouteRequest,
        now: DateTime<Utc>,
    ) -> Vec<Route> {
        let mut routes = Vec::new();

        let direct = self
            .fetch_quote(venue, &request.token_in, &request.token_out, request.amount_in, now)
            .await;
        let thin = match &direct {
            Ok(q) => q.impact_bps() > self.config.two_hop_impact_bps,
            Err(_) => true,
        };
        if let Ok(quote) = direct {
            routes.push(self.build_route(priority, vec![quote]));
        }
        if !thin {
            return routes;
        }

        for mid in &self.config.intermediates {
            if *mid == request.token_in || *mid == request.token_out {
                continue;
            }
            let Ok(first) = self
                .fetch_quote(venue, &request.token_in, mid, request.amount_in, now)
                .await
            else {
                continue;
            };
            let Ok(second) = self
                .fetch_quote(venue, mid, &request.token_out, first.amount_out, now)
                .await
            else {
                continue;
            };
            routes.push(self.build_route(priority, vec![first, second]));
        }
        routes
    }

    async fn fetch_quote(
        &self,
        venue: &Arc<dyn QuoteSource>,
        token_in: &str,
        token_out: &str,
        amount_in: u128,
        now: DateTime<Utc>,
    ) -> Result<Quote, QuoteError> {
        let result = venue.quote(token_in, token_out, amount_in).await.and_then(|q| {
            if !q.is_fresh(now, self.config.quote_freshness) {
                Err(QuoteError::Stale(venue.venue().clone()))
            } else if q.amount_out == 0 {
                Err(QuoteError::NoLiquidity {
                    venue: venue.venue().clone(),
                    token_in: token_in.to_string(),
                    token_out: token_out.to_string(),
                })
            } else {
                Ok(q)
            }
        });

        if let Err(e) = &result {
            tracing::debug!(venue = %venue.venue(), error = %e, "Quote unavailable, skipping venue");
        }
        result
    }

    fn build_route(&self, venue_priority: usize, quotes: Vec<Quote>) -> Route {
        let legs: Vec<RouteLeg> = quotes
            .into_iter()
            .map(|q| {
                let slippage_bps = expected_slippage_bps(self.config.base_slippage_bps, q.impact_bps());
                RouteLeg {
                    min_acceptable_amount_out: min_acceptable_amount_out(q.amount_out, slippage_bps),
                    venue: q.venue,
                    token_in: q.token_in,
                    token_out: q.token_out,
                    amount_in: q.amount_in,
                    amount_out: q.amount_out,
                    fee_bps: q.fee_bps,
                    slippage_bps,
                    liquidity_in: q.liquidity_in,
                    gas_estimate_out: q.gas_estimate_out,
                }
            })
            .collect();

        let slippage_bps = legs
            .iter()
            .fold(0u32, |acc, l| acc.saturating_add(l.slippage_bps));
        let amount_in = legs.first().map(|l| l.amount_in).unwrap_or(0);
        let amount_out = legs.last().map(|l| l.amount_out).unwrap_or(0);

        // Carry each leg's gas forward through the remaining legs' exchange rates.
        let mut gas_cost_out: u128 = 0;
        for (i, leg) in legs.iter().enumerate() {
            let mut gas = leg.gas_estimate_out;
            for next in &legs[i + 1..] {
                gas = mul_div(gas, next.amount_out, next.amount_in).unwrap_or(u128::MAX);
            }
            gas_cost_out = gas_cost_out.saturating_add(gas);
        }

        Route {
            min_acceptable_amount_out: min_acceptable_amount_out(amount_out, slippage_bps),
            legs,
            amount_in,
            amount_out,
            gas_cost_out,
            slippage_bps,
            venue_priority,
        }
    }
}

fn rank_routes(a: &Route, b: &Route) -> Ordering {
    b.net_out()
        .cmp(&a.net_out())
        .then(a.hops().cmp(&b.hops()))
        .then(a.venue_priority.cmp(&b.venue_priority))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;

    const Q: &str = "0xq";
    const T: &str = "0xt";
    const M: &str = "0xm";

    /// Fixed-rate venue: out = in × num / den, optional pool depth and gas.
    struct Fixed {
        id: VenueId,
        rates: HashMap<(String, String), (u128, u128)>,
        liquidity: Option<u128>,
        gas_out: u128,
        stale: bool,
    }

    impl Fixed {
        fn new(name: &str) -> Self {
            Self {
                id: VenueId::new(name),
                rates: HashMap::new(),
                liquidity: None,
                gas_out: 0,
                stale: false,
            }
        }

        fn rate(mut self, a: &str, b: &str, num: u128, den: u128) -> Self {
            self.rates.insert((a.into(), b.into()), (num, den));
            self
        }
    }

    #[async_trait]
    impl QuoteSource for Fixed {
        fn venue(&self) -> &VenueId {
            &self.id
        }

        async fn quote(&self, token_in: &str, token_out: &str, amount_in: u128) -> Result<Quote, QuoteError> {
            let (num, den) = self
                .rates
                .get(&(token_in.to_string(), token_out.to_string()))
                .copied()
                .ok_or_else(|| QuoteError::NoLiquidity {
                    venue: self.id.clone(),
                    token_in: token_in.into(),
                    token_out: token_out.into(),
                })?;
            Ok(Quote {
                venue: self.id.clone(),
                token_in: token_in.into(),
                token_out: token_out.into(),
                amount_in,
                amount_out: amount_in * num / den,
                fee_bps: 30,
                liquidity_in: self.liquidity,
                gas_estimate_out: self.gas_out,
                stale: self.stale,
                quoted_at: Utc::now(),
            })
        }
    }

    fn optimizer(venues: Vec<Fixed>, config: RoutingConfig) -> RouteOptimizer {
        RouteOptimizer::new(
            venues.into_iter().map(|v| Arc::new(v) as Arc<dyn QuoteSource>).collect(),
            config,
        )
    }

    #[test]
    fn slippage_model_is_clamped() {
        assert_eq!(expected_slippage_bps(10, 0), MIN_LEG_SLIPPAGE_BPS);
        assert_eq!(expected_slippage_bps(10, 100), 160);
        assert_eq!(expected_slippage_bps(10, 10_000), MAX_LEG_SLIPPAGE_BPS);
        assert_eq!(min_acceptable_amount_out(1_000_000, 30), 997_000);
    }

    #[tokio::test]
    async fn picks_highest_net_output() {
        let router = optimizer(
            vec![Fixed::new("alpha").rate(Q, T, 100, 100), Fixed::new("beta").rate(Q, T, 102, 100)],
            RoutingConfig::default(),
        );
        let route = router.find_best_route(&RouteRequest::new(Q, T, 1_000)).await.unwrap();
        assert_eq!(route.legs[0].venue, VenueId::new("beta"));
        assert_eq!(route.amount_out, 1_020);
    }

    #[tokio::test]
    async fn gas_counts_against_net_output() {
        let mut expensive = Fixed::new("alpha").rate(Q, T, 102, 100);
        expensive.gas_out = 50;
        let router = optimizer(
            vec![expensive, Fixed::new("beta").rate(Q, T, 100, 100)],
            RoutingConfig::default(),
        );
        let route = router.find_best_route(&RouteRequest::new(Q, T, 1_000)).await.unwrap();
        assert_eq!(route.legs[0].venue, VenueId::new("beta"));
    }

    #[tokio::test]
    async fn ties_go_to_configuration_order() {
        let router = optimizer(
            vec![Fixed::new("alpha").rate(Q, T, 1, 1), Fixed::new("beta").rate(Q, T, 1, 1)],
            RoutingConfig::default(),
        );
        let route = router.find_best_route(&RouteRequest::new(Q, T, 1_000)).await.unwrap();
        assert_eq!(route.venue_priority, 0);
        assert_eq!(route.legs[0].venue, VenueId::new("alpha"));
    }

    #[tokio::test]
    async fn thin_pools_are_rejected_by_tolerance() {
        let mut thin = Fixed::new("alpha").rate(Q, T, 1, 1);
        thin.liquidity = Some(10_000); // 10% of pool -> 800 bps expected slippage
        let router = optimizer(vec![thin], RoutingConfig::default());
        let err = router.find_best_route(&RouteRequest::new(Q, T, 1_000)).await.unwrap_err();
        assert!(matches!(err, RouteError::NotFound { .. }));
    }

    #[tokio::test]
    async fn falls_back_to_two_hop_when_direct_missing() {
        let venue = Fixed::new("alpha").rate(Q, M, 2, 1).rate(M, T, 1, 2);
        let config = RoutingConfig {
            intermediates: vec![M.into()],
            ..RoutingConfig::default()
        };
        let router = optimizer(vec![venue], config);
        let route = router.find_best_route(&RouteRequest::new(Q, T, 1_000)).await.unwrap();
        assert_eq!(route.hops(), 2);
        assert_eq!(route.amount_out, 1_000);
        assert_eq!(route.slippage_bps, 2 * MIN_LEG_SLIPPAGE_BPS);
    }

    #[tokio::test]
    async fn direct_route_preferred_on_equal_output() {
        let venue = Fixed::new("alpha").rate(Q, T, 1, 1).rate(Q, M, 1, 1).rate(M, T, 1, 1);
        let mut thin_direct = venue;
        thin_direct.liquidity = Some(50_000); // 200 bps impact triggers the two-hop search
        let config = RoutingConfig {
            intermediates: vec![M.into()],
            slippage_tolerance_bps: 800,
            ..RoutingConfig::default()
        };
        let router = optimizer(vec![thin_direct], config);
        let route = router.find_best_route(&RouteRequest::new(Q, T, 1_000)).await.unwrap();
        assert_eq!(route.hops(), 1);
    }

    #[tokio::test]
    async fn min_net_out_acts_as_profit_threshold() {
        let router = optimizer(vec![Fixed::new("alpha").rate(Q, T, 1, 1)], RoutingConfig::default());
        let req = RouteRequest::new(Q, T, 1_000).with_min_net_out(1_001);
        assert!(matches!(
            router.find_best_route(&req).await,
            Err(RouteError::NotFound { .. })
        ));
        let req = RouteRequest::new(Q, T, 1_000).with_min_net_out(1_000);
        assert!(router.find_best_route(&req).await.is_ok());
    }

    #[tokio::test]
    async fn stale_quotes_are_skipped() {
        let mut stale = Fixed::new("alpha").rate(Q, T, 2, 1);
        stale.stale = true;
        let router = optimizer(
            vec![stale, Fixed::new("beta").rate(Q, T, 1, 1)],
            RoutingConfig::default(),
        );
        let route = router.find_best_route(&RouteRequest::new(Q, T, 1_000)).await.unwrap();
        assert_eq!(route.legs[0].venue, VenueId::new("beta"));
    }

    #[tokio::test]
    async fn returned_routes_respect_tolerance() {
        for depth in [1_000_000u128, 200_000, 100_000, 50_000, 20_000] {
            let mut venue = Fixed::new("alpha").rate(Q, T, 1, 1);
            venue.liquidity = Some(depth);
            let router = optimizer(vec![venue], RoutingConfig::default());
            for amount in [1u128, 333, 1_000, 7_777] {
                if let Ok(route) = router.find_best_route(&RouteRequest::new(Q, T, amount)).await {
                    let gap = route.amount_out - route.min_acceptable_amount_out;
                    // (out - min) / out <= tolerance, compared without division
                    assert!(gap * 10_000 <= route.amount_out * 100);
                    assert!(route.implied_slippage_bps() <= 100);
                }
            }
        }
    }

    #[tokio::test]
    async fn requote_chains_legs() {
        let router = optimizer(
            vec![Fixed::new("alpha").rate(Q, T, 1, 1), Fixed::new("beta").rate(T, Q, 11, 10)],
            RoutingConfig::default(),
        );
        let legs = vec![
            Leg { venue: VenueId::new("alpha"), token_in: Q.into(), token_out: T.into() },
            Leg { venue: VenueId::new("beta"), token_in: T.into(), token_out: Q.into() },
        ];
        let route = router.requote(&legs, 500).await.unwrap();
        assert_eq!(route.amount_out, 550);
        assert_eq!(route.legs[1].amount_in, 500);

        let unknown = vec![Leg { venue: VenueId::new("gamma"), token_in: Q.into(), token_out: T.into() }];
        assert!(matches!(
            router.requote(&unknown, 500).await,
            Err(RouteError::UnknownVenue(_))
        ));
    }
}
