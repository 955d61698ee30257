use serde_json::json;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::ledger::Ledger;
use crate::models::token::display_value;
use crate::models::{ActivityEvent, EventCategory, Token, TradeRecord};

/// Telegram notification service. Failures are logged but never block the main flow.
#[derive(Debug, Clone)]
pub struct Notifier {
    http: reqwest::Client,
    bot_token: String,
    chat_id: String,
}

impl Notifier {
    pub fn new(bot_token: String, chat_id: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            bot_token,
            chat_id,
        }
    }

    /// Send a Telegram message. Failures are logged as warnings.
    pub async fn send(&self, message: &str) {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);

        let body = json!({
            "chat_id": self.chat_id,
            "text": message,
            "parse_mode": "Markdown",
        });

        match self.http.post(&url).json(&body).send().await {
            Ok(resp) => {
                if !resp.status().is_success() {
                    tracing::warn!(status = %resp.status(), "Telegram sendMessage returned non-2xx");
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to send Telegram notification");
            }
        }
    }
}

/// Only trade results and errors are worth a push notification.
pub fn should_forward(event: &ActivityEvent) -> bool {
    matches!(event.category, EventCategory::TradeExecuted | EventCategory::Error)
}

pub fn format_activity(event: &ActivityEvent) -> String {
    let title = match event.category {
        EventCategory::TradeExecuted => "Trade Executed",
        EventCategory::Error => "Error",
        EventCategory::Warning => "Warning",
        EventCategory::OpportunityFound => "Opportunity",
        EventCategory::Info => "Info",
    };
    format!("*{}* [{}]\n{}", title, event.mode, event.message)
}

/// Format a committed trade for a notification or a log line.
pub fn format_trade_report(record: &TradeRecord, quote: &Token) -> String {
    let decimals = quote.decimals;
    let signed = |v: i128| {
        let magnitude = display_value(v.unsigned_abs(), decimals).round_dp(2);
        if v < 0 {
            format!("-{magnitude}")
        } else {
            magnitude.to_string()
        }
    };
    format!(
        "*Trade {}*\nKind: {}\nIn: {}\nOut: {}\nNet: {} {}\nRealized: {} {}\nLegs: {}",
        record.outcome,
        record.kind.map(|k| k.as_str()).unwrap_or("-"),
        record.amount_in,
        record.amount_out,
        signed(record.net_result),
        quote.symbol,
        signed(record.realized_pnl),
        quote.symbol,
        record.legs.len(),
    )
}

/// Forward activity to Telegram until the feed closes. Executed trades are
/// sent as a full trade report when the ledger still has the record.
pub async fn run_notifier(
    notifier: Notifier,
    mut rx: broadcast::Receiver<ActivityEvent>,
    ledger: Ledger,
    quote: Token,
) {
    loop {
        match rx.recv().await {
            Ok(event) if should_forward(&event) => {
                let record = event
                    .related_trade_id
                    .filter(|_| event.category == EventCategory::TradeExecuted)
                    .and_then(|id| ledger.recent_trades(50).into_iter().find(|t| t.id == id));
                let message = match record {
                    Some(record) => format_trade_report(&record, &quote),
                    None => format_activity(&event),
                };
                notifier.send(&message).await;
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Notifier fell behind the activity feed");
            }
            Err(RecvError::Closed) => break,
        }
    }
    tracing::info!("Notifier stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OpportunityKind, TokenAmount, TradeOutcome, TradingMode};
    use chrono::Utc;
    use uuid::Uuid;

    fn event(category: EventCategory) -> ActivityEvent {
        ActivityEvent {
            seq: 1,
            timestamp: Utc::now(),
            category,
            mode: TradingMode::Paper,
            message: "arbitrage trade committed".into(),
            related_trade_id: None,
        }
    }

    #[test]
    fn forwards_trades_and_errors_only() {
        assert!(should_forward(&event(EventCategory::TradeExecuted)));
        assert!(should_forward(&event(EventCategory::Error)));
        assert!(!should_forward(&event(EventCategory::OpportunityFound)));
        assert!(!should_forward(&event(EventCategory::Info)));
    }

    #[test]
    fn activity_message_carries_mode() {
        let text = format_activity(&event(EventCategory::Error));
        assert!(text.starts_with("*Error* [paper]"));
        assert!(text.contains("arbitrage trade committed"));
    }

    #[test]
    fn trade_report_shows_signed_amounts() {
        let record = TradeRecord {
            id: Uuid::new_v4(),
            opportunity_id: None,
            mode: TradingMode::Simulation,
            kind: Some(OpportunityKind::Arbitrage),
            legs: Vec::new(),
            amount_in: TokenAmount::new("0xq", 500_000_000, 6),
            amount_out: TokenAmount::new("0xq", 490_000_000, 6),
            fees_paid: 0,
            net_result: -10_000_000,
            realized_pnl: -10_000_000,
            outcome: TradeOutcome::Success,
            timestamp: Utc::now(),
            note: None,
        };
        let text = format_trade_report(&record, &Token::new("USDC", "0xq", 6));
        assert!(text.contains("Net: -10.00 USDC"), "{text}");
        assert!(text.contains("Kind: arbitrage"));
    }
}
