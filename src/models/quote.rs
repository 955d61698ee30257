use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::math::bps_of;

/// Identifier of a DEX venue, e.g. `uniswap_v2`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VenueId(pub String);

impl VenueId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VenueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A venue's answer to "how much `token_out` for `amount_in` of `token_in`".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    pub venue: VenueId,
    pub token_in: String,
    pub token_out: String,
    pub amount_in: u128,
    pub amount_out: u128,
    pub fee_bps: u32,
    /// Pool reserve of `token_in`, when the venue exposes it.
    pub liquidity_in: Option<u128>,
    /// Gas for this swap, already converted into `token_out` base units.
    pub gas_estimate_out: u128,
    pub stale: bool,
    pub quoted_at: DateTime<Utc>,
}

impl Quote {
    pub fn is_fresh(&self, now: DateTime<Utc>, window: Duration) -> bool {
        !self.stale && now.signed_duration_since(self.quoted_at) <= window
    }

    /// Price impact implied by the trade size against pool depth. Zero when depth is unknown.
    pub fn impact_bps(&self) -> u32 {
        match self.liquidity_in {
            Some(liquidity) => bps_of(self.amount_in, liquidity),
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(liquidity_in: Option<u128>, age_secs: i64, stale: bool) -> (Quote, DateTime<Utc>) {
        let now = Utc::now();
        let q = Quote {
            venue: VenueId::new("alpha"),
            token_in: "0xa".into(),
            token_out: "0xb".into(),
            amount_in: 1_000,
            amount_out: 990,
            fee_bps: 30,
            liquidity_in,
            gas_estimate_out: 0,
            stale,
            quoted_at: now - Duration::seconds(age_secs),
        };
        (q, now)
    }

    #[test]
    fn freshness_window() {
        let (q, now) = quote(None, 2, false);
        assert!(q.is_fresh(now, Duration::seconds(3)));
        let (q, now) = quote(None, 4, false);
        assert!(!q.is_fresh(now, Duration::seconds(3)));
        let (q, now) = quote(None, 0, true);
        assert!(!q.is_fresh(now, Duration::seconds(3)));
    }

    #[test]
    fn impact_against_liquidity() {
        assert_eq!(quote(Some(100_000), 0, false).0.impact_bps(), 100);
        assert_eq!(quote(None, 0, false).0.impact_bps(), 0);
        assert_eq!(quote(Some(0), 0, false).0.impact_bps(), u32::MAX);
    }
}
