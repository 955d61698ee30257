mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;

use common::*;
use dexbot::execution::engine::{emergency_stop, run_cycle, run_trading_engine, Dispatcher, EngineConfig};
use dexbot::execution::{Authorization, ExecutionState, RiskViolation};
use dexbot::models::{ExitReason, OpportunityKind, PositionStatus, TradeOutcome, TradingMode};
use dexbot::venues::QuoteSource;

fn single_venue(price: u128) -> (Arc<FixedRateVenue>, Vec<Arc<dyn QuoteSource>>) {
    let venue = Arc::new(FixedRateVenue::weth_at("dex", price));
    let venues: Vec<Arc<dyn QuoteSource>> = vec![venue.clone()];
    (venue, venues)
}

#[tokio::test]
async fn test_cycle_dispatches_and_commits_arbitrage() {
    let ctx = context(Setup::new(arbitrage_venues()));
    let mut scanner = scanner(&ctx, &[OpportunityKind::Arbitrage]);
    let mut dispatcher = Dispatcher::new(4);

    let summary = run_cycle(&ctx, &mut scanner, &mut dispatcher).await;
    assert_eq!(summary.found, 1);
    assert_eq!(summary.approved, 1);
    assert_eq!(summary.dispatched, 1);

    let reports = dispatcher.drain().await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].final_state, ExecutionState::Committed);
    assert_eq!(ctx.ledger.balance().current_amount, 10_050 * USDC);
    assert!(ctx.in_flight.is_empty());
}

#[tokio::test]
async fn test_daily_loss_halts_new_trades_until_reset() {
    let ctx = context(Setup::new(arbitrage_venues()));
    let mut scanner = scanner(&ctx, &[OpportunityKind::Arbitrage]);
    let mut dispatcher = Dispatcher::new(4);

    // 10% of $10,000 is the limit
    record_loss(&ctx, 1_100 * USDC);
    assert!(ctx.ledger.balance().is_loss_limit_breached());

    let rejected = ctx.governor.authorize_at(&arbitrage_opportunity(), &ctx.ledger, Utc::now());
    assert!(matches!(
        rejected,
        Authorization::Rejected(RiskViolation::DailyLossExceeded { .. })
    ));

    let summary = run_cycle(&ctx, &mut scanner, &mut dispatcher).await;
    assert_eq!(summary.found, 0);
    assert_eq!(summary.dispatched, 0);
    assert_eq!(ctx.ledger.trades().len(), 1);

    ctx.ledger.reset_daily_loss();
    let summary = run_cycle(&ctx, &mut scanner, &mut dispatcher).await;
    assert_eq!(summary.dispatched, 1);
    dispatcher.drain().await;
    assert_eq!(ctx.ledger.trades().len(), 2);
}

#[tokio::test]
async fn test_stop_loss_forces_exit() {
    let (venue, venues) = single_venue(1_000);
    let ctx = context(Setup::new(venues));
    let mut scanner = scanner(&ctx, &[OpportunityKind::Arbitrage]);
    let mut dispatcher = Dispatcher::new(4);

    let position = open_weth_position(&ctx, WETH_UNIT / 2, 500 * USDC);
    assert_eq!(ctx.ledger.balance().current_amount, 9_500 * USDC);

    // 0.5 WETH at 900 is worth $450, under the 5% stop at $475.
    venue.set_weth_price(900);
    let summary = run_cycle(&ctx, &mut scanner, &mut dispatcher).await;
    assert_eq!(summary.forced_exits, 1);
    assert_eq!(summary.dispatched, 1);

    let reports = dispatcher.drain().await;
    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report.kind, OpportunityKind::ForcedExit);
    assert_eq!(report.final_state, ExecutionState::Committed);

    let closed = report.closed.as_ref().expect("exit closes the position");
    assert_eq!(closed.id, position.id);
    assert_eq!(closed.status, PositionStatus::Closed);
    assert_eq!(closed.exit_reason, Some(ExitReason::StopLoss));
    assert_eq!(closed.realized_pnl, -50 * USDC as i128);

    assert!(ctx.ledger.open_positions().is_empty());
    assert_eq!(ctx.ledger.balance().current_amount, 9_950 * USDC);
    assert_eq!(ctx.ledger.balance().daily_pnl, -50 * USDC as i128);
    assert!(ctx.ledger.is_consistent());
}

#[tokio::test]
async fn test_forced_exit_runs_while_halted() {
    let (venue, venues) = single_venue(1_000);
    let ctx = context(Setup::new(venues));
    let mut scanner = scanner(&ctx, &[OpportunityKind::Arbitrage]);
    let mut dispatcher = Dispatcher::new(4);

    open_weth_position(&ctx, WETH_UNIT / 2, 500 * USDC);
    record_loss(&ctx, 1_100 * USDC);
    venue.set_weth_price(1_200);

    let summary = run_cycle(&ctx, &mut scanner, &mut dispatcher).await;
    assert_eq!(summary.forced_exits, 1);
    assert_eq!(summary.found, 0);

    let reports = dispatcher.drain().await;
    let closed = reports[0].closed.as_ref().unwrap();
    assert_eq!(closed.exit_reason, Some(ExitReason::TakeProfit));
    assert_eq!(closed.realized_pnl, 100 * USDC as i128);
}

#[tokio::test]
async fn test_halt_holds_after_profitable_exit_same_day() {
    let (venue, venues) = single_venue(1_000);
    let ctx = context(Setup::new(venues));
    let mut scanner = scanner(&ctx, &[OpportunityKind::Arbitrage]);
    let mut dispatcher = Dispatcher::new(4);

    open_weth_position(&ctx, WETH_UNIT / 2, 500 * USDC);
    record_loss(&ctx, 1_000 * USDC);
    assert!(ctx.ledger.balance().halted);

    // 0.5 WETH at 1400 takes $200 of profit, lifting the day back to -$800.
    venue.set_weth_price(1_400);
    let summary = run_cycle(&ctx, &mut scanner, &mut dispatcher).await;
    assert_eq!(summary.forced_exits, 1);
    dispatcher.drain().await;

    let balance = ctx.ledger.balance();
    assert_eq!(balance.daily_pnl, -800 * USDC as i128);
    assert!(!balance.is_loss_limit_breached());
    assert!(balance.is_halted());

    let decision = ctx.governor.authorize_at(&arbitrage_opportunity(), &ctx.ledger, Utc::now());
    assert!(matches!(
        decision,
        Authorization::Rejected(RiskViolation::DailyLossExceeded { .. })
    ));

    ctx.ledger.reset_daily_loss();
    let decision = ctx.governor.authorize_at(&arbitrage_opportunity(), &ctx.ledger, Utc::now());
    assert!(matches!(decision, Authorization::Approved { .. }));
}

#[tokio::test]
async fn test_emergency_stop_pauses_and_liquidates() {
    let (_venue, venues) = single_venue(1_000);
    let ctx = context(Setup::new(venues));
    let pause_flag = AtomicBool::new(false);
    open_weth_position(&ctx, WETH_UNIT / 2, 500 * USDC);

    let reports = emergency_stop(&ctx, &pause_flag).await;

    assert!(pause_flag.load(Ordering::Relaxed));
    assert_eq!(reports.len(), 1);
    let closed = reports[0].closed.as_ref().unwrap();
    assert_eq!(closed.exit_reason, Some(ExitReason::EmergencyStop));
    assert!(ctx.ledger.open_positions().is_empty());
    assert_eq!(ctx.ledger.balance().current_amount, 10_000 * USDC);
}

#[tokio::test]
async fn test_busy_pair_is_not_dispatched_twice() {
    let ctx = context(Setup::new(arbitrage_venues()));
    let mut dispatcher = Dispatcher::new(4);

    let _claim = ctx.in_flight.try_claim(&arbitrage_opportunity().pair).unwrap();
    assert!(!dispatcher.dispatch(&ctx, arbitrage_opportunity(), 500 * USDC));
    assert_eq!(dispatcher.in_flight(), 0);
}

#[tokio::test]
async fn test_live_cycle_reconciles_balance() {
    let gateway = Arc::new(ScriptedGateway::new(Vec::new()).with_balance(10_025 * USDC));
    let (_venue, venues) = single_venue(1_000);
    let ctx = context(Setup::new(venues).live(gateway));
    let mut scanner = scanner(&ctx, &[OpportunityKind::Arbitrage]);
    let mut dispatcher = Dispatcher::new(4);

    run_cycle(&ctx, &mut scanner, &mut dispatcher).await;

    let trades = ctx.ledger.trades();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].outcome, TradeOutcome::Reconciled);
    assert_eq!(trades[0].net_result, 25 * USDC as i128);
    assert_eq!(trades[0].realized_pnl, 0);
    assert_eq!(ctx.ledger.balance().current_amount, 10_025 * USDC);
    assert_eq!(ctx.ledger.mode(), TradingMode::Live);
}

#[tokio::test]
async fn test_engine_stops_on_shutdown() {
    let ctx = context(Setup::new(arbitrage_venues()));
    let scanner = scanner(&ctx, &[OpportunityKind::Arbitrage]);
    let pause_flag = Arc::new(AtomicBool::new(true));
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let engine = tokio::spawn(run_trading_engine(
        ctx.clone(),
        scanner,
        EngineConfig {
            scan_interval: std::time::Duration::from_millis(10),
            max_concurrent_executions: 1,
        },
        pause_flag,
        shutdown_rx,
    ));
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    shutdown_tx.send(true).unwrap();
    engine.await.unwrap();

    // Paused the whole time: nothing traded.
    assert!(ctx.ledger.trades().is_empty());
    assert!(ctx.activity.recent(10).iter().any(|e| e.message == "Trading engine stopped"));
}
