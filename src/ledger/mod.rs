pub mod store;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::amount_serde::i128_string;
use crate::models::math::{checked_apply, signed_diff};
use crate::models::position::entry_price;
use crate::models::{
    Balance, ExitReason, Position, PositionStatus, Token, TokenAmount, TokenPair, TradeRecord, TradingMode,
};

pub use store::{JsonFileStore, LedgerStore};

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("applying {delta} to balance {current} would make it negative")]
    InsufficientBalance { current: u128, delta: i128 },

    #[error("position {0} not found")]
    PositionNotFound(Uuid),

    #[error("position {0} is already closed")]
    PositionClosed(Uuid),

    #[error("trade {0} is already recorded")]
    DuplicateTrade(Uuid),

    #[error("record for {record} mode cannot be applied to the {ledger} ledger")]
    ModeMismatch { record: TradingMode, ledger: TradingMode },

    #[error("snapshot is inconsistent: balance {current} but records sum to {expected}")]
    InconsistentSnapshot { current: u128, expected: i128 },

    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u32),
}

/// A position to open as part of a commit.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPosition {
    pub pair: TokenPair,
    pub holding: TokenAmount,
    pub cost_basis: u128,
    pub stop_loss_value: u128,
    pub take_profit_value: u128,
}

/// One record plus the position changes it causes, applied atomically.
#[derive(Debug, Clone)]
pub struct TradeCommit {
    pub record: TradeRecord,
    pub open: Option<NewPosition>,
    pub close: Option<(Uuid, ExitReason)>,
}

#[derive(Debug, Clone)]
pub struct CommitOutcome {
    pub balance: Balance,
    pub opened: Option<Position>,
    pub closed: Option<Position>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub version: u32,
    pub balance: Balance,
    pub positions: Vec<Position>,
    pub trades: Vec<TradeRecord>,
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PerformanceSummary {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    #[serde(with = "i128_string")]
    pub total_realized_pnl: i128,
    #[serde(with = "i128_string")]
    pub best_trade: i128,
    #[serde(with = "i128_string")]
    pub worst_trade: i128,
}

struct LedgerInner {
    balance: Balance,
    positions: Vec<Position>,
    trades: Vec<TradeRecord>,
}

/// Balance, positions and trade history of one trading mode.
///
/// All mutation goes through one mutex and is synchronous, so a commit is
/// never observed half-applied. `current_amount` only ever changes by the
/// `net_result` of an appended record.
#[derive(Clone)]
pub struct Ledger {
    inner: Arc<Mutex<LedgerInner>>,
}

impl Ledger {
    pub fn new(mode: TradingMode, quote: &Token, starting_amount: u128, daily_loss_limit_bps: u32) -> Self {
        let balance = Balance::new(
            mode,
            &quote.address,
            quote.decimals,
            starting_amount,
            daily_loss_limit_bps,
            Utc::now().date_naive(),
        );
        Self::from_parts(balance, Vec::new(), Vec::new())
    }

    fn from_parts(balance: Balance, positions: Vec<Position>, trades: Vec<TradeRecord>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LedgerInner {
                balance,
                positions,
                trades,
            })),
        }
    }

    /// Rebuild a ledger from a snapshot, refusing one whose balance does not
    /// equal its starting amount plus the recorded cash deltas.
    pub fn restore(snapshot: LedgerSnapshot) -> Result<Self, LedgerError> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(LedgerError::UnsupportedVersion(snapshot.version));
        }
        let expected = expected_balance(&snapshot.balance, &snapshot.trades);
        if checked_apply(snapshot.balance.starting_amount, sum_net(&snapshot.trades))
            != Some(snapshot.balance.current_amount)
        {
            return Err(LedgerError::InconsistentSnapshot {
                current: snapshot.balance.current_amount,
                expected,
            });
        }
        Ok(Self::from_parts(snapshot.balance, snapshot.positions, snapshot.trades))
    }

    fn lock(&self) -> MutexGuard<'_, LedgerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn mode(&self) -> TradingMode {
        self.lock().balance.mode
    }

    pub fn balance(&self) -> Balance {
        self.balance_at(Utc::now())
    }

    /// Current balance, rolling the trading day over first if `now` is a later UTC day.
    pub fn balance_at(&self, now: DateTime<Utc>) -> Balance {
        let mut inner = self.lock();
        roll_day(&mut inner.balance, now.date_naive());
        inner.balance.clone()
    }

    pub fn positions(&self) -> Vec<Position> {
        self.lock().positions.clone()
    }

    pub fn open_positions(&self) -> Vec<Position> {
        self.lock().positions.iter().filter(|p| p.is_open()).cloned().collect()
    }

    pub fn position(&self, id: Uuid) -> Option<Position> {
        self.lock().positions.iter().find(|p| p.id == id).cloned()
    }

    pub fn open_positions_in_pair(&self, pair: &TokenPair) -> usize {
        self.lock()
            .positions
            .iter()
            .filter(|p| p.is_open() && &p.pair == pair)
            .count()
    }

    pub fn trades(&self) -> Vec<TradeRecord> {
        self.lock().trades.clone()
    }

    pub fn recent_trades(&self, limit: usize) -> Vec<TradeRecord> {
        let inner = self.lock();
        inner.trades.iter().rev().take(limit).cloned().collect()
    }

    /// Append a record that opens or closes nothing.
    pub fn apply_trade(&self, record: TradeRecord) -> Result<Balance, LedgerError> {
        self.commit(TradeCommit {
            record,
            open: None,
            close: None,
        })
        .map(|outcome| outcome.balance)
    }

    /// Open a position paid for by `record`.
    pub fn open_position(&self, record: TradeRecord, position: NewPosition) -> Result<Position, LedgerError> {
        let outcome = self.commit(TradeCommit {
            record,
            open: Some(position),
            close: None,
        })?;
        outcome.opened.ok_or(LedgerError::PositionNotFound(Uuid::nil()))
    }

    /// Close `id` with the proceeds recorded in `exit_record`.
    pub fn close_position(
        &self,
        id: Uuid,
        exit_record: TradeRecord,
        reason: ExitReason,
    ) -> Result<Balance, LedgerError> {
        self.commit(TradeCommit {
            record: exit_record,
            open: None,
            close: Some((id, reason)),
        })
        .map(|outcome| outcome.balance)
    }

    /// Apply a record and its position changes atomically. Nothing changes on error.
    pub fn commit(&self, commit: TradeCommit) -> Result<CommitOutcome, LedgerError> {
        let mut inner = self.lock();
        let record = commit.record;

        if record.mode != inner.balance.mode {
            return Err(LedgerError::ModeMismatch {
                record: record.mode,
                ledger: inner.balance.mode,
            });
        }
        if inner.trades.iter().any(|t| t.id == record.id) {
            return Err(LedgerError::DuplicateTrade(record.id));
        }
        let close_idx = match commit.close {
            Some((id, _)) => {
                let idx = inner
                    .positions
                    .iter()
                    .position(|p| p.id == id)
                    .ok_or(LedgerError::PositionNotFound(id))?;
                if !inner.positions[idx].is_open() {
                    return Err(LedgerError::PositionClosed(id));
                }
                Some(idx)
            }
            None => None,
        };
        let new_amount = checked_apply(inner.balance.current_amount, record.net_result).ok_or(
            LedgerError::InsufficientBalance {
                current: inner.balance.current_amount,
                delta: record.net_result,
            },
        )?;

        // Validation passed; mutate.
        roll_day(&mut inner.balance, record.timestamp.date_naive());
        inner.balance.current_amount = new_amount;
        inner.balance.daily_pnl = inner.balance.daily_pnl.saturating_add(record.realized_pnl);
        if inner.balance.is_loss_limit_breached() && !inner.balance.halted {
            inner.balance.halted = true;
            tracing::warn!(
                mode = %inner.balance.mode,
                daily_pnl = %inner.balance.daily_pnl,
                limit = %inner.balance.daily_loss_limit(),
                "Daily loss limit reached, trading halted for the day"
            );
        }

        let closed = close_idx.map(|idx| {
            let reason = commit.close.map(|(_, r)| r).unwrap_or(ExitReason::Manual);
            let position = &mut inner.positions[idx];
            position.status = PositionStatus::Closed;
            position.closed_at = Some(record.timestamp);
            position.exit_reason = Some(reason);
            position.realized_pnl = record.realized_pnl;
            position.clone()
        });

        let quote_decimals = inner.balance.quote_decimals;
        let opened = commit.open.map(|new| {
            let position = Position {
                id: Uuid::new_v4(),
                entry_price: entry_price(new.cost_basis, quote_decimals, &new.holding),
                pair: new.pair,
                holding: new.holding,
                cost_basis: new.cost_basis,
                stop_loss_value: new.stop_loss_value,
                take_profit_value: new.take_profit_value,
                last_value: new.cost_basis,
                status: PositionStatus::Open,
                opened_at: record.timestamp,
                opened_by: record.id,
                closed_at: None,
                exit_reason: None,
                realized_pnl: 0,
            };
            inner.positions.push(position.clone());
            position
        });

        tracing::debug!(
            trade_id = %record.id,
            outcome = %record.outcome,
            net_result = %record.net_result,
            balance = %new_amount,
            "Ledger: record applied"
        );
        inner.trades.push(record);

        Ok(CommitOutcome {
            balance: inner.balance.clone(),
            opened,
            closed,
        })
    }

    /// Record the latest exit valuation of an open position.
    pub fn update_valuation(&self, id: Uuid, value: u128) -> Result<Position, LedgerError> {
        let mut inner = self.lock();
        let position = inner
            .positions
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(LedgerError::PositionNotFound(id))?;
        if !position.is_open() {
            return Err(LedgerError::PositionClosed(id));
        }
        position.last_value = value;
        Ok(position.clone())
    }

    /// Manual override of the daily-loss halt: the rest of the day starts from the current balance.
    pub fn reset_daily_loss(&self) -> Balance {
        let mut inner = self.lock();
        let balance = &mut inner.balance;
        balance.daily_pnl = 0;
        balance.day_start_amount = balance.current_amount;
        balance.halted = false;
        tracing::warn!(mode = %balance.mode, "Daily loss counter reset by operator");
        balance.clone()
    }

    /// Move the cached Live balance onto the on-chain figure through a `Reconciled` record.
    /// Returns `None` when they already agree.
    pub fn reconcile_live_balance(
        &self,
        on_chain: u128,
        now: DateTime<Utc>,
    ) -> Result<Option<TradeRecord>, LedgerError> {
        let (mode, current, quote) = {
            let inner = self.lock();
            let b = &inner.balance;
            (
                b.mode,
                b.current_amount,
                TokenAmount::new(&b.quote_token, on_chain, b.quote_decimals),
            )
        };
        if !mode.is_live() {
            return Err(LedgerError::ModeMismatch {
                record: TradingMode::Live,
                ledger: mode,
            });
        }
        let delta = signed_diff(on_chain, current);
        if delta == 0 {
            return Ok(None);
        }
        let record = TradeRecord::reconciliation(mode, &quote, delta, now);
        self.apply_trade(record.clone())?;
        tracing::info!(delta = %delta, on_chain = %on_chain, "Live balance reconciled");
        Ok(Some(record))
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        let inner = self.lock();
        LedgerSnapshot {
            version: SNAPSHOT_VERSION,
            balance: inner.balance.clone(),
            positions: inner.positions.clone(),
            trades: inner.trades.clone(),
            saved_at: Utc::now(),
        }
    }

    pub fn performance(&self) -> PerformanceSummary {
        let inner = self.lock();
        let mut summary = PerformanceSummary::default();
        for record in inner.trades.iter().filter(|t| t.is_trade()) {
            let pnl = record.realized_pnl;
            if summary.total_trades == 0 {
                summary.best_trade = pnl;
                summary.worst_trade = pnl;
            }
            summary.total_trades += 1;
            summary.total_realized_pnl = summary.total_realized_pnl.saturating_add(pnl);
            summary.best_trade = summary.best_trade.max(pnl);
            summary.worst_trade = summary.worst_trade.min(pnl);
            if pnl > 0 {
                summary.winning_trades += 1;
            } else if pnl < 0 {
                summary.losing_trades += 1;
            }
        }
        summary
    }

    /// `current_amount == starting_amount + Σ net_result`.
    pub fn is_consistent(&self) -> bool {
        let inner = self.lock();
        checked_apply(inner.balance.starting_amount, sum_net(&inner.trades))
            == Some(inner.balance.current_amount)
    }
}

fn roll_day(balance: &mut Balance, today: NaiveDate) {
    if balance.roll_day(today) {
        tracing::info!(
            mode = %balance.mode,
            day = %today,
            day_start = %balance.day_start_amount,
            "New trading day, daily loss counter reset"
        );
    }
}

fn sum_net(trades: &[TradeRecord]) -> i128 {
    trades.iter().fold(0i128, |acc, t| acc.saturating_add(t.net_result))
}

fn expected_balance(balance: &Balance, trades: &[TradeRecord]) -> i128 {
    i128::try_from(balance.starting_amount)
        .unwrap_or(i128::MAX)
        .saturating_add(sum_net(trades))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
