use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::math::{apply_bps, BPS_DENOMINATOR};

/// How much of an opportunity's proposed size to take before the cap applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizingStrategy {
    /// Take the proposed size as is.
    Full,
    /// Scale the proposed size by the opportunity's confidence.
    ConfidenceScaled,
}

impl SizingStrategy {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "confidence" | "confidence_scaled" => SizingStrategy::ConfidenceScaled,
            _ => SizingStrategy::Full,
        }
    }
}

impl fmt::Display for SizingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizingStrategy::Full => write!(f, "full"),
            SizingStrategy::ConfidenceScaled => write!(f, "confidence_scaled"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeDecision {
    pub requested: u128,
    pub cap: u128,
    pub sized: u128,
}

impl SizeDecision {
    pub fn was_clamped(&self) -> bool {
        self.sized < self.requested
    }
}

/// Largest single trade allowed for a balance.
pub fn max_position_size(balance: u128, max_position_bps: u32) -> u128 {
    apply_bps(balance, max_position_bps)
}

/// `min(strategy(requested), max_position_bps × balance)`.
pub fn calculate_size(
    strategy: SizingStrategy,
    requested: u128,
    confidence: Decimal,
    balance: u128,
    max_position_bps: u32,
) -> SizeDecision {
    let wanted = match strategy {
        SizingStrategy::Full => requested,
        SizingStrategy::ConfidenceScaled => confidence_scaled(requested, confidence),
    };
    let cap = max_position_size(balance, max_position_bps);
    SizeDecision {
        requested,
        cap,
        sized: wanted.min(cap),
    }
}

fn confidence_scaled(requested: u128, confidence: Decimal) -> u128 {
    let bps = (confidence.max(Decimal::ZERO).min(Decimal::ONE) * Decimal::from(BPS_DENOMINATOR))
        .round()
        .to_u32()
        .unwrap_or(0);
    apply_bps(requested, bps)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
