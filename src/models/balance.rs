use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::amount_serde::{i128_string, u128_string};
use super::math::apply_bps;
use super::token::display_value;
use super::TradingMode;

/// Quote-token balance of one trading mode, with the day's loss accounting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub mode: TradingMode,
    pub quote_token: String,
    pub quote_decimals: u8,
    #[serde(with = "u128_string")]
    pub starting_amount: u128,
    #[serde(with = "u128_string")]
    pub current_amount: u128,
    /// Realized PnL since the start of `trading_day` (UTC).
    #[serde(with = "i128_string")]
    pub daily_pnl: i128,
    pub daily_loss_limit_bps: u32,
    pub trading_day: NaiveDate,
    #[serde(with = "u128_string")]
    pub day_start_amount: u128,
    pub halted: bool,
}

impl Balance {
    pub fn new(
        mode: TradingMode,
        quote_token: &str,
        quote_decimals: u8,
        starting_amount: u128,
        daily_loss_limit_bps: u32,
        today: NaiveDate,
    ) -> Self {
        Self {
            mode,
            quote_token: quote_token.to_lowercase(),
            quote_decimals,
            starting_amount,
            current_amount: starting_amount,
            daily_pnl: 0,
            daily_loss_limit_bps,
            trading_day: today,
            day_start_amount: starting_amount,
            halted: false,
        }
    }

    pub fn daily_loss_limit(&self) -> u128 {
        apply_bps(self.day_start_amount, self.daily_loss_limit_bps)
    }

    pub fn daily_loss_limit_remaining(&self) -> u128 {
        let limit = i128::try_from(self.daily_loss_limit()).unwrap_or(i128::MAX);
        limit.saturating_add(self.daily_pnl).max(0).unsigned_abs()
    }

    /// `daily_pnl <= -limit`, counting only actual losses.
    pub fn is_loss_limit_breached(&self) -> bool {
        let limit = i128::try_from(self.daily_loss_limit()).unwrap_or(i128::MAX);
        self.daily_pnl < 0 && self.daily_pnl <= -limit
    }

    /// Latched for the rest of the trading day once the limit is hit, even if
    /// later exits bring `daily_pnl` back above it.
    pub fn is_halted(&self) -> bool {
        self.halted || self.is_loss_limit_breached()
    }

    /// Start a new trading day if `today` is later than the current one.
    pub fn roll_day(&mut self, today: NaiveDate) -> bool {
        if today <= self.trading_day {
            return false;
        }
        self.trading_day = today;
        self.daily_pnl = 0;
        self.day_start_amount = self.current_amount;
        self.halted = false;
        true
    }

    pub fn current_display(&self) -> Decimal {
        display_value(self.current_amount, self.quote_decimals)
    }

    pub fn daily_pnl_display(&self) -> Decimal {
        let magnitude = display_value(self.daily_pnl.unsigned_abs(), self.quote_decimals);
        if self.daily_pnl < 0 {
            -magnitude
        } else {
            magnitude
        }
    }
}
