//! Narrow seams to the outside world: per-venue quote sources and the
//! blockchain gateway that signs and submits swaps.

pub mod http;
pub mod simulated;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::models::{Quote, Token, TokenAmount, VenueId};

pub use http::{HttpGateway, HttpQuoteSource};
pub use simulated::{simulated_market, MarketSpec, SimulatedVenue};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuoteError {
    #[error("venue {venue} unreachable: {reason}")]
    Unreachable { venue: VenueId, reason: String },

    #[error("no liquidity on {venue} for {token_in} -> {token_out}")]
    NoLiquidity {
        venue: VenueId,
        token_in: String,
        token_out: String,
    },

    #[error("quote from {0} is stale")]
    Stale(VenueId),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("transient gateway error: {0}")]
    Transient(String),

    #[error("transaction reverted: {0}")]
    Reverted(String),

    #[error("swap rejected: {0}")]
    Rejected(String),
}

impl GatewayError {
    /// Only transient failures are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Transient(_))
    }
}

/// A single swap handed to the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapLeg {
    pub venue: VenueId,
    pub token_in: String,
    pub token_out: String,
    pub amount_in: u128,
    /// The swap must revert on-chain rather than deliver less than this.
    pub min_acceptable_amount_out: u128,
    pub deadline: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHash(pub String);

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapReceipt {
    pub tx_hash: TxHash,
    /// False when the transaction was mined but reverted.
    pub confirmed: bool,
    pub amount_out: u128,
    pub gas_used: u64,
    /// Gas cost in quote-token base units.
    pub fee_paid: u128,
}

/// Price discovery for one venue. One instance per configured venue.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    fn venue(&self) -> &VenueId;

    async fn quote(
        &self,
        token_in: &str,
        token_out: &str,
        amount_in: u128,
    ) -> Result<Quote, QuoteError>;
}

/// Signing, submission and confirmation of swaps. Key material stays behind this trait.
#[async_trait]
pub trait BlockchainGateway: Send + Sync {
    async fn submit_swap(&self, leg: &SwapLeg) -> Result<TxHash, GatewayError>;

    async fn confirm_swap(&self, tx_hash: &TxHash) -> Result<SwapReceipt, GatewayError>;

    async fn get_balance(&self, token: &Token) -> Result<TokenAmount, GatewayError>;
}
