pub mod amount_serde;
pub mod balance;
pub mod event;
pub mod math;
pub mod opportunity;
pub mod position;
pub mod quote;
pub mod token;
pub mod trade;

pub use balance::Balance;
pub use event::{ActivityEvent, EventCategory};
pub use opportunity::{Leg, Opportunity, OpportunityKind};
pub use position::{ExitReason, Position, PositionStatus};
pub use quote::{Quote, VenueId};
pub use token::{Token, TokenAmount, TokenPair};
pub use trade::{ExecutedLeg, TradeOutcome, TradeRecord};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// TradingMode
// ---------------------------------------------------------------------------

/// Which money a ledger tracks. Each mode has its own ledger and balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    Simulation,
    Paper,
    Live,
}

impl TradingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradingMode::Simulation => "simulation",
            TradingMode::Paper => "paper",
            TradingMode::Live => "live",
        }
    }

    /// Live is the only mode whose swaps go through the blockchain gateway.
    pub fn is_live(&self) -> bool {
        matches!(self, TradingMode::Live)
    }
}

impl FromStr for TradingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "simulation" | "sim" => Ok(TradingMode::Simulation),
            "paper" => Ok(TradingMode::Paper),
            "live" => Ok(TradingMode::Live),
            other => Err(format!("unknown trading mode '{other}'")),
        }
    }
}

impl fmt::Display for TradingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
