use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{interval, MissedTickBehavior};

use super::risk_manager::{Authorization, RiskGovernor};
use super::trade_executor::{ExecutionReport, TradeExecutor};
use crate::intelligence::OpportunityScanner;
use crate::ledger::{Ledger, LedgerStore};
use crate::models::{ExitReason, Opportunity, Token, TokenPair, TradingMode};
use crate::routing::RouteOptimizer;
use crate::services::activity::ActivityFeed;
use crate::services::position_monitor;
use crate::venues::BlockchainGateway;

/// Everything the trading components share, built once at startup.
#[derive(Clone)]
pub struct TradingContext {
    pub mode: TradingMode,
    pub quote_token: Token,
    pub ledger: Ledger,
    pub governor: Arc<RiskGovernor>,
    pub router: Arc<RouteOptimizer>,
    pub executor: Arc<TradeExecutor>,
    pub activity: ActivityFeed,
    pub gateway: Option<Arc<dyn BlockchainGateway>>,
    pub store: Option<Arc<dyn LedgerStore>>,
    pub in_flight: InFlightPairs,
    pub opportunity_ttl: chrono::Duration,
}

impl TradingContext {
    /// Save a ledger snapshot if a store is configured. Failures are logged only.
    pub fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(e) = store.save(&self.ledger.snapshot()) {
            tracing::error!(error = %e, mode = %self.mode, "Failed to persist ledger snapshot");
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub scan_interval: Duration,
    pub max_concurrent_executions: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(10),
            max_concurrent_executions: 4,
        }
    }
}

/// Token pairs with an execution in flight. At most one per pair.
#[derive(Clone, Default)]
pub struct InFlightPairs {
    pairs: Arc<Mutex<HashSet<String>>>,
}

impl InFlightPairs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `pair` until the returned guard is dropped. `None` if already claimed.
    pub fn try_claim(&self, pair: &TokenPair) -> Option<PairGuard> {
        let key = pair.key();
        let mut pairs = self.pairs.lock().unwrap_or_else(PoisonError::into_inner);
        if !pairs.insert(key.clone()) {
            return None;
        }
        Some(PairGuard {
            pairs: self.pairs.clone(),
            key,
        })
    }

    pub fn contains(&self, pair: &TokenPair) -> bool {
        self.pairs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&pair.key())
    }

    pub fn len(&self) -> usize {
        self.pairs.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct PairGuard {
    pairs: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl Drop for PairGuard {
    fn drop(&mut self) {
        self.pairs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

/// Bounded set of executions running in the background.
pub struct Dispatcher {
    semaphore: Arc<Semaphore>,
    tasks: JoinSet<ExecutionReport>,
}

impl Dispatcher {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            tasks: JoinSet::new(),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Start executing `opportunity` at `amount`. Returns false when its pair
    /// is busy or every execution slot is taken.
    pub fn dispatch(&mut self, ctx: &TradingContext, opportunity: Opportunity, amount: u128) -> bool {
        let Some(guard) = ctx.in_flight.try_claim(&opportunity.pair) else {
            tracing::debug!(pair = %opportunity.pair, opportunity_id = %opportunity.id, "Pair busy, skipping");
            return false;
        };
        let Ok(permit) = self.semaphore.clone().try_acquire_owned() else {
            tracing::debug!(opportunity_id = %opportunity.id, "All execution slots busy, skipping");
            return false;
        };

        let executor = ctx.executor.clone();
        self.tasks.spawn(async move {
            let _permit = permit;
            let _guard = guard;
            executor.execute(&opportunity, amount).await
        });
        true
    }

    /// Collect executions that already finished, without waiting.
    pub fn reap(&mut self) -> Vec<ExecutionReport> {
        let mut done = Vec::new();
        while let Some(joined) = self.tasks.try_join_next() {
            collect(joined, &mut done);
        }
        done
    }

    /// Wait for every running execution.
    pub async fn drain(&mut self) -> Vec<ExecutionReport> {
        let mut done = Vec::new();
        while let Some(joined) = self.tasks.join_next().await {
            collect(joined, &mut done);
        }
        done
    }
}

fn collect(joined: Result<ExecutionReport, tokio::task::JoinError>, done: &mut Vec<ExecutionReport>) {
    match joined {
        Ok(report) => done.push(report),
        Err(e) => tracing::error!(error = %e, "Execution task panicked"),
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleSummary {
    pub found: usize,
    pub approved: usize,
    pub rejected: usize,
    pub forced_exits: usize,
    pub dispatched: usize,
}

/// Run the trading loop until `shutdown` flips to true. The pause flag skips
/// whole cycles; executions already running are awaited before returning.
pub async fn run_trading_engine(
    ctx: TradingContext,
    mut scanner: OpportunityScanner,
    config: EngineConfig,
    pause_flag: Arc<AtomicBool>,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!(
        mode = %ctx.mode,
        scan_interval_ms = config.scan_interval.as_millis() as u64,
        max_concurrent = config.max_concurrent_executions,
        "Trading engine started"
    );
    ctx.activity.info(format!("Trading engine started in {} mode", ctx.mode));

    let mut dispatcher = Dispatcher::new(config.max_concurrent_executions);
    let mut ticker = interval(config.scan_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                dispatcher.reap();
                if pause_flag.load(Ordering::Relaxed) {
                    tracing::debug!("Trading engine paused, skipping cycle");
                    continue;
                }
                run_cycle(&ctx, &mut scanner, &mut dispatcher).await;
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    let pending = dispatcher.in_flight();
    if pending > 0 {
        tracing::info!(pending, "Waiting for in-flight executions");
    }
    dispatcher.drain().await;
    ctx.persist();
    ctx.activity.info("Trading engine stopped");
    tracing::info!(mode = %ctx.mode, "Trading engine stopped");
}

/// One pass: refresh the Live balance, value positions and dispatch forced
/// exits, then scan, authorize and dispatch new opportunities.
pub async fn run_cycle(
    ctx: &TradingContext,
    scanner: &mut OpportunityScanner,
    dispatcher: &mut Dispatcher,
) -> CycleSummary {
    let started = Instant::now();
    let now = Utc::now();
    let mut summary = CycleSummary::default();

    // In-flight swaps would be counted twice against a fresh on-chain figure.
    if ctx.mode.is_live() && dispatcher.in_flight() == 0 {
        refresh_live_balance(ctx, now).await;
    }

    for exit in position_monitor::refresh_positions(ctx, now).await {
        summary.forced_exits += 1;
        let amount = exit.amount_in.raw;
        ctx.activity.warning(format!(
            "Forcing exit of position {} ({})",
            exit.closes_position.map(|id| id.to_string()).unwrap_or_default(),
            exit.exit_reason.map(|r| r.as_str()).unwrap_or("manual")
        ));
        if dispatcher.dispatch(ctx, exit, amount) {
            summary.dispatched += 1;
        }
    }

    let balance = ctx.ledger.balance_at(now);
    if balance.is_halted() {
        tracing::debug!(daily_pnl = %balance.daily_pnl, "Daily loss limit reached, not scanning");
        histogram!("scan_cycle_seconds").record(started.elapsed().as_secs_f64());
        ctx.persist();
        return summary;
    }

    let found = scanner.scan(balance.current_amount, now).await;
    summary.found = found.len();
    counter!("opportunities_found_total").increment(found.len() as u64);

    for opportunity in found {
        ctx.activity.opportunity(format!(
            "{} opportunity on {}: expected profit {} (confidence {})",
            opportunity.kind,
            opportunity.pair,
            opportunity.expected_profit,
            opportunity.confidence.round_dp(2)
        ));
        match ctx.governor.authorize_at(&opportunity, &ctx.ledger, now) {
            Authorization::Approved { amount } => {
                summary.approved += 1;
                if dispatcher.dispatch(ctx, opportunity, amount) {
                    summary.dispatched += 1;
                }
            }
            Authorization::Rejected(violation) => {
                summary.rejected += 1;
                counter!("risk_rejections_total", "stage" => "authorize").increment(1);
                ctx.activity.warning(format!(
                    "{} opportunity on {} rejected: {violation}",
                    opportunity.kind, opportunity.pair
                ));
            }
        }
    }

    histogram!("scan_cycle_seconds").record(started.elapsed().as_secs_f64());
    tracing::debug!(
        found = summary.found,
        approved = summary.approved,
        rejected = summary.rejected,
        forced_exits = summary.forced_exits,
        dispatched = summary.dispatched,
        "Cycle complete"
    );
    ctx.persist();
    summary
}

async fn refresh_live_balance(ctx: &TradingContext, now: DateTime<Utc>) {
    let Some(gateway) = &ctx.gateway else {
        return;
    };
    match gateway.get_balance(&ctx.quote_token).await {
        Ok(on_chain) => match ctx.ledger.reconcile_live_balance(on_chain.raw, now) {
            Ok(Some(record)) => {
                ctx.activity.info(format!(
                    "Live balance reconciled to on-chain {} ({:+} base units)",
                    on_chain, record.net_result
                ));
            }
            Ok(None) => {}
            Err(e) => tracing::error!(error = %e, "Live balance reconciliation failed"),
        },
        Err(e) => {
            tracing::warn!(error = %e, "Failed to refresh live balance");
            ctx.activity.warning(format!("Live balance refresh failed: {e}"));
        }
    }
}

/// Pause trading and liquidate every open position. Returns the exit reports.
pub async fn emergency_stop(ctx: &TradingContext, pause_flag: &AtomicBool) -> Vec<ExecutionReport> {
    pause_flag.store(true, Ordering::Relaxed);
    tracing::warn!(mode = %ctx.mode, "Emergency stop: trading paused, exiting all positions");
    ctx.activity.warning("Emergency stop: trading paused, exiting all positions");

    let exits = position_monitor::exit_opportunities(ctx, ExitReason::EmergencyStop, Utc::now()).await;
    let mut reports = Vec::with_capacity(exits.len());
    for exit in exits {
        let Some(_guard) = ctx.in_flight.try_claim(&exit.pair) else {
            ctx.activity.error(
                format!("Emergency exit of {} skipped: execution already in flight", exit.pair),
                None,
            );
            continue;
        };
        reports.push(ctx.executor.execute(&exit, exit.amount_in.raw).await);
    }
    ctx.persist();
    reports
}
