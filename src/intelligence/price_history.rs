use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use crate::models::math::{mul_div, signed_diff, BPS_DENOMINATOR};

/// One probe of a pair: how many tokens `probe_in` quote units bought.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceSample {
    pub probe_in: u128,
    pub amount_out: u128,
    pub liquidity: Option<u128>,
    pub observed_at: DateTime<Utc>,
}

/// Bounded rolling buffer of samples for one pair; the oldest sample is evicted first.
#[derive(Debug, Clone)]
pub struct PriceHistory {
    capacity: usize,
    samples: VecDeque<PriceSample>,
}

impl PriceHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, sample: PriceSample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<&PriceSample> {
        self.samples.back()
    }

    pub fn previous(&self) -> Option<&PriceSample> {
        self.samples.len().checked_sub(2).and_then(|i| self.samples.get(i))
    }

    /// Price move from the oldest to the newest sample, in bps.
    pub fn change_bps(&self) -> Option<i64> {
        price_change_bps(self.samples.front()?, self.samples.back()?)
    }

    /// Price move over the most recent step, in bps.
    pub fn last_step_change_bps(&self) -> Option<i64> {
        price_change_bps(self.previous()?, self.latest()?)
    }

    /// Relative change in pool depth over the most recent step, in bps.
    pub fn liquidity_shift_bps(&self) -> Option<i64> {
        let before = self.previous()?.liquidity?;
        let after = self.latest()?.liquidity?;
        if before == 0 {
            return None;
        }
        let delta = signed_diff(after, before);
        let magnitude = mul_div(delta.unsigned_abs(), BPS_DENOMINATOR as u128, before)?;
        let magnitude = i64::try_from(magnitude).unwrap_or(i64::MAX);
        Some(if delta < 0 { -magnitude } else { magnitude })
    }
}

/// Change in token price (quote per token) between two samples, in bps.
/// Positive means the token got more expensive.
pub fn price_change_bps(old: &PriceSample, new: &PriceSample) -> Option<i64> {
    if old.amount_out == 0 || new.amount_out == 0 || old.probe_in == 0 {
        return None;
    }
    // price = probe_in / amount_out, so new/old = (new_in * old_out) / (new_out * old_in)
    let ratio = mul_div(new.probe_in, old.amount_out, new.amount_out)?;
    let ratio_bps = mul_div(ratio, BPS_DENOMINATOR as u128, old.probe_in)?;
    let ratio_bps = i64::try_from(ratio_bps).ok()?;
    Some(ratio_bps - BPS_DENOMINATOR as i64)
}
