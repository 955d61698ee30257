use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::amount_serde::{i128_string, u128_string};
use super::math::signed_diff;
use super::token::display_value;
use super::{TokenAmount, TokenPair};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    EmergencyStop,
    /// Closed by a trade that left the bot in another token after a partial fill.
    Rolled,
    Manual,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::StopLoss => "stop_loss",
            ExitReason::TakeProfit => "take_profit",
            ExitReason::EmergencyStop => "emergency_stop",
            ExitReason::Rolled => "rolled",
            ExitReason::Manual => "manual",
        }
    }
}

/// Tokens the bot holds as the result of an opening trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub pair: TokenPair,
    pub holding: TokenAmount,
    /// Quote-token base units paid for `holding`.
    #[serde(with = "u128_string")]
    pub cost_basis: u128,
    /// Quote per token, display only.
    pub entry_price: Decimal,
    #[serde(with = "u128_string")]
    pub stop_loss_value: u128,
    #[serde(with = "u128_string")]
    pub take_profit_value: u128,
    /// Most recent exit value in quote-token base units.
    #[serde(with = "u128_string")]
    pub last_value: u128,
    pub status: PositionStatus,
    pub opened_at: DateTime<Utc>,
    pub opened_by: Uuid,
    pub closed_at: Option<DateTime<Utc>>,
    pub exit_reason: Option<ExitReason>,
    #[serde(with = "i128_string")]
    pub realized_pnl: i128,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    pub fn unrealized_pnl(&self) -> i128 {
        signed_diff(self.last_value, self.cost_basis)
    }

    /// Which threshold, if any, a valuation crosses. Stop-loss wins when both apply.
    pub fn exit_trigger(&self, value: u128) -> Option<ExitReason> {
        if value <= self.stop_loss_value {
            Some(ExitReason::StopLoss)
        } else if value >= self.take_profit_value {
            Some(ExitReason::TakeProfit)
        } else {
            None
        }
    }
}

/// Quote paid per display unit of token held.
pub fn entry_price(cost_basis: u128, quote_decimals: u8, holding: &TokenAmount) -> Decimal {
    let tokens = holding.to_display();
    if tokens.is_zero() {
        return Decimal::ZERO;
    }
    display_value(cost_basis, quote_decimals)
        .checked_div(tokens)
        .unwrap_or(Decimal::ZERO)
}
