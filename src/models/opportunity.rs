use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::amount_serde::i128_string;
use super::{ExitReason, TokenAmount, TokenPair, VenueId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityKind {
    Arbitrage,
    Momentum,
    WhaleFollow,
    /// Stop-loss / take-profit liquidation raised by the risk governor.
    ForcedExit,
}

impl OpportunityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpportunityKind::Arbitrage => "arbitrage",
            OpportunityKind::Momentum => "momentum",
            OpportunityKind::WhaleFollow => "whale_follow",
            OpportunityKind::ForcedExit => "forced_exit",
        }
    }

    /// Kinds that leave the bot holding a non-quote token.
    pub fn opens_position(&self) -> bool {
        matches!(self, OpportunityKind::Momentum | OpportunityKind::WhaleFollow)
    }
}

impl FromStr for OpportunityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "arbitrage" => Ok(OpportunityKind::Arbitrage),
            "momentum" => Ok(OpportunityKind::Momentum),
            "whale_follow" | "whale_activity" | "whale" => Ok(OpportunityKind::WhaleFollow),
            other => Err(format!("unknown strategy '{other}'")),
        }
    }
}

impl fmt::Display for OpportunityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One hop of an opportunity: swap `token_in` for `token_out` on `venue`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Leg {
    pub venue: VenueId,
    pub token_in: String,
    pub token_out: String,
}

/// A candidate trade. Immutable once built; ids are derived from content so
/// two scans of the same market state produce the same ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: Uuid,
    pub kind: OpportunityKind,
    pub pair: TokenPair,
    pub legs: Vec<Leg>,
    pub amount_in: TokenAmount,
    pub expected_out: TokenAmount,
    /// Quote-token base units; negative means an expected loss.
    #[serde(with = "i128_string")]
    pub expected_profit: i128,
    pub confidence: Decimal,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub closes_position: Option<Uuid>,
    /// Why a forced exit was raised.
    #[serde(default)]
    pub exit_reason: Option<ExitReason>,
}

/// Everything needed to build an [`Opportunity`].
#[derive(Debug, Clone)]
pub struct OpportunityDraft {
    pub kind: OpportunityKind,
    pub pair: TokenPair,
    pub legs: Vec<Leg>,
    pub amount_in: TokenAmount,
    pub expected_out: TokenAmount,
    pub expected_profit: i128,
    pub confidence: Decimal,
    pub closes_position: Option<Uuid>,
}

impl Opportunity {
    pub fn new(draft: OpportunityDraft, now: DateTime<Utc>, ttl: Duration) -> Self {
        let id = content_id(&draft);
        Self {
            id,
            kind: draft.kind,
            pair: draft.pair,
            legs: draft.legs,
            amount_in: draft.amount_in,
            expected_out: draft.expected_out,
            expected_profit: draft.expected_profit,
            confidence: clamp_confidence(draft.confidence),
            created_at: now,
            expires_at: now + ttl,
            closes_position: draft.closes_position,
            exit_reason: None,
        }
    }

    pub fn with_exit_reason(mut self, reason: ExitReason) -> Self {
        self.exit_reason = Some(reason);
        self
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Ranking key: expected profit weighted by confidence.
    pub fn score(&self) -> Decimal {
        let profit = Decimal::try_from_i128_with_scale(self.expected_profit, 0).unwrap_or(
            if self.expected_profit < 0 {
                Decimal::MIN
            } else {
                Decimal::MAX
            },
        );
        profit.checked_mul(self.confidence).unwrap_or(profit)
    }

    pub fn token_in(&self) -> &str {
        &self.amount_in.token
    }

    pub fn token_out(&self) -> &str {
        &self.expected_out.token
    }

    /// Same trade re-priced at a new size, keeping the id.
    pub fn resized(&self, amount_in: u128, expected_out: u128, expected_profit: i128) -> Self {
        Self {
            amount_in: self.amount_in.with_raw(amount_in),
            expected_out: self.expected_out.with_raw(expected_out),
            expected_profit,
            ..self.clone()
        }
    }
}

pub fn clamp_confidence(confidence: Decimal) -> Decimal {
    confidence.max(Decimal::ZERO).min(Decimal::ONE)
}

fn content_id(draft: &OpportunityDraft) -> Uuid {
    let mut key = format!(
        "{}|{}|{}|{}",
        draft.kind.as_str(),
        draft.amount_in.token,
        draft.amount_in.raw,
        draft.expected_out.raw
    );
    for leg in &draft.legs {
        key.push_str(&format!("|{}:{}>{}", leg.venue, leg.token_in, leg.token_out));
    }
    if let Some(position) = draft.closes_position {
        key.push_str(&format!("|close:{position}"));
    }
    Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes())
}
