use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use rust_decimal::Decimal;

use super::{QuoteError, QuoteSource};
use crate::models::math::{mul_div, BPS_DENOMINATOR};
use crate::models::token::raw_from_display;
use crate::models::{Quote, Token, VenueId};

const MAX_DRIFT_STEPS: i64 = 10;

/// Constant-product pool reserves, keyed by the lexically smaller token first.
#[derive(Debug, Clone, Copy)]
struct Pool {
    reserve_a: u128,
    reserve_b: u128,
}

struct MarketState {
    pools: BTreeMap<(String, String), Pool>,
    rng: StdRng,
    last_drift: DateTime<Utc>,
}

/// In-process venue backed by x·y=k pools whose prices follow a seeded random walk.
/// Lets the whole bot run in Simulation mode without any external service.
pub struct SimulatedVenue {
    venue: VenueId,
    quote_token: String,
    fee_bps: u32,
    /// Gas per swap in quote-token base units.
    gas_cost_quote: u128,
    volatility_bps: u32,
    drift_interval: Duration,
    state: Mutex<MarketState>,
}

impl SimulatedVenue {
    pub fn new(venue: VenueId, quote_token: &str, seed: u64) -> Self {
        Self {
            venue,
            quote_token: quote_token.to_lowercase(),
            fee_bps: 30,
            gas_cost_quote: 0,
            volatility_bps: 0,
            drift_interval: Duration::seconds(5),
            state: Mutex::new(MarketState {
                pools: BTreeMap::new(),
                rng: StdRng::seed_from_u64(seed),
                last_drift: Utc::now(),
            }),
        }
    }

    pub fn with_fee_bps(mut self, fee_bps: u32) -> Self {
        self.fee_bps = fee_bps.min(BPS_DENOMINATOR);
        self
    }

    pub fn with_gas_cost(mut self, gas_cost_quote: u128) -> Self {
        self.gas_cost_quote = gas_cost_quote;
        self
    }

    pub fn with_volatility(mut self, volatility_bps: u32, drift_interval: Duration) -> Self {
        self.volatility_bps = volatility_bps.min(BPS_DENOMINATOR / 2);
        self.drift_interval = drift_interval;
        self
    }

    pub fn with_pool(mut self, token_x: &str, reserve_x: u128, token_y: &str, reserve_y: u128) -> Self {
        let (x, y) = (token_x.to_lowercase(), token_y.to_lowercase());
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        let (key, pool) = if x <= y {
            ((x, y), Pool { reserve_a: reserve_x, reserve_b: reserve_y })
        } else {
            ((y, x), Pool { reserve_a: reserve_y, reserve_b: reserve_x })
        };
        state.pools.insert(key, pool);
        self
    }

    /// Current `(reserve_in, reserve_out)` for a direction, if the pool exists.
    pub fn reserves(&self, token_in: &str, token_out: &str) -> Option<(u128, u128)> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        pool_reserves(&state.pools, token_in, token_out)
    }

    fn maybe_drift(&self, state: &mut MarketState, now: DateTime<Utc>) {
        if self.volatility_bps == 0 || self.drift_interval <= Duration::zero() {
            return;
        }
        let elapsed = now.signed_duration_since(state.last_drift);
        let interval_ms = self.drift_interval.num_milliseconds().max(1);
        let steps = (elapsed.num_milliseconds() / interval_ms).min(MAX_DRIFT_STEPS);
        if steps <= 0 {
            return;
        }

        let vol = self.volatility_bps as i64;
        for _ in 0..steps {
            for pool in state.pools.values_mut() {
                let shock = state.rng.gen_range(-vol..=vol);
                let up = (BPS_DENOMINATOR as i64 + shock) as u128;
                let base = BPS_DENOMINATOR as u128;
                // Shift price while keeping the product of reserves roughly constant.
                pool.reserve_b = mul_div(pool.reserve_b, up, base).unwrap_or(pool.reserve_b);
                pool.reserve_a = mul_div(pool.reserve_a, base, up).unwrap_or(pool.reserve_a);
            }
        }
        state.last_drift = now;
    }

    fn gas_in(&self, pools: &BTreeMap<(String, String), Pool>, token_out: &str) -> u128 {
        if self.gas_cost_quote == 0 || token_out == self.quote_token {
            return self.gas_cost_quote;
        }
        match pool_reserves(pools, &self.quote_token, token_out) {
            Some((r_quote, r_token)) => mul_div(self.gas_cost_quote, r_token, r_quote).unwrap_or(0),
            None => 0,
        }
    }
}

fn pool_reserves(
    pools: &BTreeMap<(String, String), Pool>,
    token_in: &str,
    token_out: &str,
) -> Option<(u128, u128)> {
    let (tin, tout) = (token_in.to_lowercase(), token_out.to_lowercase());
    if tin <= tout {
        pools.get(&(tin, tout)).map(|p| (p.reserve_a, p.reserve_b))
    } else {
        pools.get(&(tout, tin)).map(|p| (p.reserve_b, p.reserve_a))
    }
}

/// Shape of a simulated market: one venue per name, each holding a pool of
/// every priced token against the quote token.
#[derive(Debug, Clone)]
pub struct MarketSpec {
    pub quote: Token,
    pub prices: Vec<(Token, Decimal)>,
    /// Quote-side reserve of each pool.
    pub depth: u128,
    pub fee_bps: u32,
    pub gas_cost_quote: u128,
    pub volatility_bps: u32,
    /// Price offset between consecutive venues, so cross-venue gaps exist from the start.
    pub venue_spread_bps: u32,
    pub seed: u64,
}

pub fn simulated_market(spec: &MarketSpec, venues: &[String]) -> Vec<SimulatedVenue> {
    venues
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let mut venue = SimulatedVenue::new(VenueId::new(name.clone()), &spec.quote.address, spec.seed.wrapping_add(i as u64))
                .with_fee_bps(spec.fee_bps)
                .with_gas_cost(spec.gas_cost_quote)
                .with_volatility(spec.volatility_bps, Duration::seconds(5));

            let offset = Decimal::from(BPS_DENOMINATOR + spec.venue_spread_bps * i as u32)
                / Decimal::from(BPS_DENOMINATOR);
            let depth_display = crate::models::token::display_value(spec.depth, spec.quote.decimals);
            for (token, price) in &spec.prices {
                let Some(reserve) = raw_from_display(depth_display / (*price * offset), token.decimals) else {
                    continue;
                };
                if reserve == 0 {
                    continue;
                }
                venue = venue.with_pool(&spec.quote.address, spec.depth, &token.address, reserve);
            }
            venue
        })
        .collect()
}

/// Uniswap-v2 style output for an exact input.
pub fn constant_product_out(reserve_in: u128, reserve_out: u128, amount_in: u128, fee_bps: u32) -> u128 {
    let base = BPS_DENOMINATOR as u128;
    let in_with_fee = mul_div(amount_in, base - fee_bps.min(BPS_DENOMINATOR) as u128, base).unwrap_or(0);
    let denominator = match reserve_in.checked_add(in_with_fee) {
        Some(d) => d,
        None => return 0,
    };
    mul_div(in_with_fee, reserve_out, denominator).unwrap_or(0)
}

#[async_trait]
impl QuoteSource for SimulatedVenue {
    fn venue(&self) -> &VenueId {
        &self.venue
    }

    async fn quote(&self, token_in: &str, token_out: &str, amount_in: u128) -> Result<Quote, QuoteError> {
        let now = Utc::now();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.maybe_drift(&mut state, now);

        let no_liquidity = || QuoteError::NoLiquidity {
            venue: self.venue.clone(),
            token_in: token_in.to_string(),
            token_out: token_out.to_string(),
        };
        let (reserve_in, reserve_out) =
            pool_reserves(&state.pools, token_in, token_out).ok_or_else(no_liquidity)?;
        if reserve_in == 0 || reserve_out == 0 {
            return Err(no_liquidity());
        }

        Ok(Quote {
            venue: self.venue.clone(),
            token_in: token_in.to_lowercase(),
            token_out: token_out.to_lowercase(),
            amount_in,
            amount_out: constant_product_out(reserve_in, reserve_out, amount_in, self.fee_bps),
            fee_bps: self.fee_bps,
            liquidity_in: Some(reserve_in),
            gas_estimate_out: self.gas_in(&state.pools, &token_out.to_lowercase()),
            stale: false,
            quoted_at: now,
        })
    }
}
