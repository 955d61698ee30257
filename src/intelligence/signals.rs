use rust_decimal::Decimal;

use super::price_history::PriceHistory;

/// Thresholds for the history-based strategies.
#[derive(Debug, Clone)]
pub struct SignalConfig {
    /// Minimum price rise across the buffer for a momentum entry.
    pub momentum_threshold_bps: u32,
    /// Minimum single-step pool depth change for a whale-follow entry.
    pub whale_liquidity_shift_bps: u32,
    /// Samples required before momentum is evaluated.
    pub min_samples: usize,
    /// Upper bound on the profit a signal may promise.
    pub max_expected_move_bps: u32,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            momentum_threshold_bps: 200,
            whale_liquidity_shift_bps: 500,
            min_samples: 3,
            max_expected_move_bps: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signal {
    /// Expected further move in the token's favour, in bps of the entry size.
    pub expected_move_bps: u32,
    pub confidence: Decimal,
}

/// Price rose by at least the threshold from the oldest to the newest sample.
/// Expects half the observed move to continue; confidence grows with the move,
/// saturating at four times the threshold.
pub fn detect_momentum(history: &PriceHistory, config: &SignalConfig) -> Option<Signal> {
    if history.len() < config.min_samples.max(2) || config.momentum_threshold_bps == 0 {
        return None;
    }
    let change = history.change_bps()?;
    let threshold = config.momentum_threshold_bps as i64;
    if change < threshold {
        return None;
    }

    let confidence = ratio(change, threshold * 4);
    Some(Signal {
        expected_move_bps: cap_move(change / 2, config),
        confidence,
    })
}

/// A large buy: pool depth on the quote side jumped while the price rose.
pub fn detect_whale(history: &PriceHistory, config: &SignalConfig) -> Option<Signal> {
    if config.whale_liquidity_shift_bps == 0 {
        return None;
    }
    let shift = history.liquidity_shift_bps()?;
    let price_move = history.last_step_change_bps()?;
    let threshold = config.whale_liquidity_shift_bps as i64;
    if shift < threshold || price_move <= 0 {
        return None;
    }

    // 0.5 at the threshold, approaching 0.9 for shifts of twice the threshold or more.
    let excess = ratio(shift - threshold, threshold);
    let confidence = Decimal::new(5, 1) + Decimal::new(4, 1) * excess;
    Some(Signal {
        expected_move_bps: cap_move(price_move, config),
        confidence,
    })
}

fn ratio(value: i64, scale: i64) -> Decimal {
    if scale <= 0 {
        return Decimal::ONE;
    }
    (Decimal::from(value) / Decimal::from(scale))
        .max(Decimal::ZERO)
        .min(Decimal::ONE)
}

fn cap_move(move_bps: i64, config: &SignalConfig) -> u32 {
    u32::try_from(move_bps.max(0))
        .unwrap_or(u32::MAX)
        .min(config.max_expected_move_bps)
}
