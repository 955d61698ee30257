use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::{ActivityEvent, EventCategory, TradingMode};

/// Ordered, append-only activity stream of one trading mode.
///
/// Sequence numbers are assigned under the same lock that appends to the
/// in-memory history, so subscribers and `recent()` agree on order.
#[derive(Clone)]
pub struct ActivityFeed {
    tx: broadcast::Sender<ActivityEvent>,
    mode: TradingMode,
    capacity: usize,
    history: Arc<Mutex<FeedHistory>>,
}

struct FeedHistory {
    next_seq: u64,
    events: VecDeque<ActivityEvent>,
}

impl ActivityFeed {
    pub fn new(mode: TradingMode, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            mode,
            capacity,
            history: Arc::new(Mutex::new(FeedHistory {
                next_seq: 1,
                events: VecDeque::with_capacity(capacity),
            })),
        }
    }

    pub fn mode(&self) -> TradingMode {
        self.mode
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ActivityEvent> {
        self.tx.subscribe()
    }

    pub fn emit(
        &self,
        category: EventCategory,
        message: impl Into<String>,
        related_trade_id: Option<Uuid>,
    ) -> ActivityEvent {
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        let event = ActivityEvent {
            seq: history.next_seq,
            timestamp: Utc::now(),
            category,
            mode: self.mode,
            message: message.into(),
            related_trade_id,
        };
        history.next_seq += 1;
        if history.events.len() == self.capacity {
            history.events.pop_front();
        }
        history.events.push_back(event.clone());
        // No subscribers is fine; the history still keeps the event.
        let _ = self.tx.send(event.clone());
        event
    }

    pub fn info(&self, message: impl Into<String>) -> ActivityEvent {
        self.emit(EventCategory::Info, message, None)
    }

    pub fn warning(&self, message: impl Into<String>) -> ActivityEvent {
        self.emit(EventCategory::Warning, message, None)
    }

    pub fn error(&self, message: impl Into<String>, related_trade_id: Option<Uuid>) -> ActivityEvent {
        self.emit(EventCategory::Error, message, related_trade_id)
    }

    pub fn opportunity(&self, message: impl Into<String>) -> ActivityEvent {
        self.emit(EventCategory::OpportunityFound, message, None)
    }

    pub fn trade_executed(&self, message: impl Into<String>, trade_id: Uuid) -> ActivityEvent {
        self.emit(EventCategory::TradeExecuted, message, Some(trade_id))
    }

    /// Most recent events, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<ActivityEvent> {
        let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        let skip = history.events.len().saturating_sub(limit);
        history.events.iter().skip(skip).cloned().collect()
    }
}
