use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::TradingMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Info,
    OpportunityFound,
    Warning,
    Error,
    TradeExecuted,
}

/// One entry of the ordered activity stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub category: EventCategory,
    pub mode: TradingMode,
    pub message: String,
    pub related_trade_id: Option<Uuid>,
}
