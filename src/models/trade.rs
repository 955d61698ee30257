use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::amount_serde::{i128_string, u128_string};
use super::{OpportunityKind, TokenAmount, TradingMode, VenueId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeOutcome {
    Success,
    PartialFailure,
    Failed,
    /// Balance correction from an on-chain refresh, not a trade.
    Reconciled,
}

impl fmt::Display for TradeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TradeOutcome::Success => "success",
            TradeOutcome::PartialFailure => "partial_failure",
            TradeOutcome::Failed => "failed",
            TradeOutcome::Reconciled => "reconciled",
        };
        f.write_str(s)
    }
}

/// A swap that actually happened (or was simulated).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutedLeg {
    pub venue: VenueId,
    pub token_in: String,
    pub token_out: String,
    #[serde(with = "u128_string")]
    pub amount_in: u128,
    #[serde(with = "u128_string")]
    pub amount_out: u128,
    /// Gas paid, in quote-token base units.
    #[serde(with = "u128_string")]
    pub fee_paid: u128,
    pub tx_hash: Option<String>,
}

/// Append-only record of one execution attempt that touched the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: Uuid,
    pub opportunity_id: Option<Uuid>,
    pub mode: TradingMode,
    pub kind: Option<OpportunityKind>,
    pub legs: Vec<ExecutedLeg>,
    pub amount_in: TokenAmount,
    pub amount_out: TokenAmount,
    #[serde(with = "u128_string")]
    pub fees_paid: u128,
    /// Signed change to the mode's quote balance.
    #[serde(with = "i128_string")]
    pub net_result: i128,
    #[serde(with = "i128_string")]
    pub realized_pnl: i128,
    pub outcome: TradeOutcome,
    pub timestamp: DateTime<Utc>,
    pub note: Option<String>,
}

impl TradeRecord {
    /// A balance correction that moves the cached balance onto the on-chain figure.
    pub fn reconciliation(
        mode: TradingMode,
        quote: &TokenAmount,
        net_result: i128,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            opportunity_id: None,
            mode,
            kind: None,
            legs: Vec::new(),
            amount_in: quote.with_raw(0),
            amount_out: quote.clone(),
            fees_paid: 0,
            net_result,
            realized_pnl: 0,
            outcome: TradeOutcome::Reconciled,
            timestamp,
            note: Some("on-chain balance refresh".into()),
        }
    }

    pub fn is_trade(&self) -> bool {
        self.outcome != TradeOutcome::Reconciled
    }
}
