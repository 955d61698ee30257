#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use dexbot::execution::engine::{InFlightPairs, TradingContext};
use dexbot::execution::{ExecutionConfig, RiskGovernor, RiskLimits, SimulationConfig, TradeExecutor};
use dexbot::intelligence::{OpportunityScanner, ScannerConfig, SignalConfig};
use dexbot::ledger::{Ledger, NewPosition};
use dexbot::models::opportunity::OpportunityDraft;
use dexbot::models::{
    Leg, Opportunity, OpportunityKind, Position, Quote, Token, TokenPair, TradeOutcome, TradeRecord,
    TradingMode, VenueId,
};
use dexbot::routing::{RouteOptimizer, RoutingConfig};
use dexbot::services::activity::ActivityFeed;
use dexbot::venues::{BlockchainGateway, GatewayError, QuoteSource, SwapLeg, SwapReceipt, TxHash};

pub const USDC: u128 = 1_000_000;
pub const WETH_UNIT: u128 = 1_000_000_000_000_000_000;

pub fn usdc() -> Token {
    Token::new("USDC", "0xusdc", 6)
}

pub fn weth() -> Token {
    Token::new("WETH", "0xweth", 18)
}

// ---------------------------------------------------------------------------
// Venues
// ---------------------------------------------------------------------------

/// Venue quoting `out = in × num / den` per direction. Rates can be changed
/// mid-test to move the market.
pub struct FixedRateVenue {
    id: VenueId,
    rates: Mutex<HashMap<(String, String), (u128, u128)>>,
}

impl FixedRateVenue {
    pub fn new(name: &str) -> Self {
        Self {
            id: VenueId::new(name),
            rates: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_rate(self, token_in: &str, token_out: &str, num: u128, den: u128) -> Self {
        self.set_rate(token_in, token_out, num, den);
        self
    }

    pub fn set_rate(&self, token_in: &str, token_out: &str, num: u128, den: u128) {
        self.rates
            .lock()
            .unwrap()
            .insert((token_in.to_string(), token_out.to_string()), (num, den));
    }

    /// WETH priced at `price` USDC in both directions.
    pub fn weth_at(name: &str, price: u128) -> Self {
        let venue = Self::new(name);
        venue.set_weth_price(price);
        venue
    }

    pub fn set_weth_price(&self, price: u128) {
        // 1 USDC (1e6) buys 1e18 / price WETH base units
        self.set_rate("0xusdc", "0xweth", 1_000_000_000_000, price);
        self.set_rate("0xweth", "0xusdc", price, 1_000_000_000_000);
    }
}

#[async_trait]
impl QuoteSource for FixedRateVenue {
    fn venue(&self) -> &VenueId {
        &self.id
    }

    async fn quote(&self, token_in: &str, token_out: &str, amount_in: u128) -> Result<Quote, dexbot::venues::QuoteError> {
        let rate = self
            .rates
            .lock()
            .unwrap()
            .get(&(token_in.to_string(), token_out.to_string()))
            .copied();
        let Some((num, den)) = rate else {
            return Err(dexbot::venues::QuoteError::NoLiquidity {
                venue: self.id.clone(),
                token_in: token_in.to_string(),
                token_out: token_out.to_string(),
            });
        };
        Ok(Quote {
            venue: self.id.clone(),
            token_in: token_in.to_string(),
            token_out: token_out.to_string(),
            amount_in,
            amount_out: amount_in * num / den,
            fee_bps: 0,
            liquidity_in: None,
            gas_estimate_out: 0,
            stale: false,
            quoted_at: Utc::now(),
        })
    }
}

/// Venue "cheap" sells WETH at 1000 USDC, venue "rich" buys it back at 1100.
pub fn arbitrage_venues() -> Vec<Arc<dyn QuoteSource>> {
    vec![
        Arc::new(FixedRateVenue::new("cheap").with_rate("0xusdc", "0xweth", 1_000_000_000_000, 1_000)),
        Arc::new(FixedRateVenue::new("rich").with_rate("0xweth", "0xusdc", 1_100, 1_000_000_000_000)),
    ]
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum Step {
    /// Submission fails with this error; the next step is used for the retry.
    SubmitFails(GatewayError),
    /// Submitted and confirmed with this output and gas fee.
    Fill { amount_out: u128, fee: u128 },
    /// Mined but reverted, still charging gas.
    Revert { fee: u128 },
    /// Confirmation never arrives.
    Hang,
}

/// Gateway that plays back a fixed script, one step per submission attempt.
#[derive(Default)]
pub struct ScriptedGateway {
    steps: Mutex<VecDeque<Step>>,
    pending: Mutex<HashMap<String, Step>>,
    submitted: Mutex<Vec<SwapLeg>>,
    balance: Mutex<u128>,
}

impl ScriptedGateway {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            ..Self::default()
        }
    }

    pub fn with_balance(self, raw: u128) -> Self {
        *self.balance.lock().unwrap() = raw;
        self
    }

    pub fn submitted(&self) -> Vec<SwapLeg> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl BlockchainGateway for ScriptedGateway {
    async fn submit_swap(&self, leg: &SwapLeg) -> Result<TxHash, GatewayError> {
        self.submitted.lock().unwrap().push(leg.clone());
        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| GatewayError::Rejected("script exhausted".into()))?;
        if let Step::SubmitFails(error) = step {
            return Err(error);
        }
        let mut pending = self.pending.lock().unwrap();
        let hash = format!("0xtx{}", pending.len() + 1);
        pending.insert(hash.clone(), step);
        Ok(TxHash(hash))
    }

    async fn confirm_swap(&self, tx_hash: &TxHash) -> Result<SwapReceipt, GatewayError> {
        let step = self.pending.lock().unwrap().get(&tx_hash.0).cloned();
        match step {
            Some(Step::Fill { amount_out, fee }) => Ok(SwapReceipt {
                tx_hash: tx_hash.clone(),
                confirmed: true,
                amount_out,
                gas_used: 21_000,
                fee_paid: fee,
            }),
            Some(Step::Revert { fee }) => Ok(SwapReceipt {
                tx_hash: tx_hash.clone(),
                confirmed: false,
                amount_out: 0,
                gas_used: 21_000,
                fee_paid: fee,
            }),
            Some(Step::Hang) => std::future::pending().await,
            _ => Err(GatewayError::Rejected(format!("unknown transaction {tx_hash}"))),
        }
    }

    async fn get_balance(&self, token: &Token) -> Result<dexbot::models::TokenAmount, GatewayError> {
        Ok(token.amount(*self.balance.lock().unwrap()))
    }
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Knobs for [`context`]. Defaults: $10,000 Simulation ledger, exact fills, no gas.
pub struct Setup {
    pub mode: TradingMode,
    pub starting: u128,
    pub venues: Vec<Arc<dyn QuoteSource>>,
    pub gateway: Option<Arc<dyn BlockchainGateway>>,
    pub limits: RiskLimits,
    pub execution: ExecutionConfig,
}

impl Setup {
    pub fn new(venues: Vec<Arc<dyn QuoteSource>>) -> Self {
        Self {
            mode: TradingMode::Simulation,
            starting: 10_000 * USDC,
            venues,
            gateway: None,
            limits: RiskLimits::default(),
            execution: ExecutionConfig {
                confirmation_timeout: std::time::Duration::from_millis(100),
                retry_backoff: std::time::Duration::from_millis(1),
                ..ExecutionConfig::default()
            },
        }
    }

    pub fn live(mut self, gateway: Arc<dyn BlockchainGateway>) -> Self {
        self.mode = TradingMode::Live;
        self.gateway = Some(gateway);
        self
    }
}

pub fn context(setup: Setup) -> TradingContext {
    let quote = usdc();
    let ledger = Ledger::new(setup.mode, &quote, setup.starting, setup.limits.daily_loss_limit_bps);
    let activity = ActivityFeed::new(setup.mode, 256);
    let router = Arc::new(RouteOptimizer::new(setup.venues, RoutingConfig::default()));
    let governor = Arc::new(RiskGovernor::new(setup.limits));

    let mut executor = TradeExecutor::new(
        quote.clone(),
        ledger.clone(),
        Arc::clone(&router),
        Arc::clone(&governor),
        activity.clone(),
    )
    .with_config(setup.execution)
    .with_simulation(SimulationConfig {
        slippage_bps: 0,
        gas_fee: 0,
        failure_bps: 0,
        seed: 1,
    })
    .with_tokens(&[weth()]);
    if let Some(gateway) = &setup.gateway {
        executor = executor.with_gateway(Arc::clone(gateway));
    }

    TradingContext {
        mode: setup.mode,
        quote_token: quote,
        ledger,
        governor,
        router,
        executor: Arc::new(executor),
        activity,
        gateway: setup.gateway,
        store: None,
        in_flight: InFlightPairs::new(),
        opportunity_ttl: Duration::seconds(30),
    }
}

pub fn scanner(ctx: &TradingContext, enabled: &[OpportunityKind]) -> OpportunityScanner {
    scanner_with_router(Arc::clone(&ctx.router), enabled)
}

pub fn scanner_with_router(router: Arc<RouteOptimizer>, enabled: &[OpportunityKind]) -> OpportunityScanner {
    OpportunityScanner::new(
        router,
        ScannerConfig {
            quote_token: usdc(),
            tracked_tokens: vec![weth()],
            enabled: enabled.iter().copied().collect(),
            min_profit: USDC,
            probe_amount: 500 * USDC,
            max_position_bps: 500,
            history_len: 10,
            opportunity_ttl: Duration::seconds(30),
            signals: SignalConfig::default(),
        },
    )
}

/// 500 USDC → WETH on "cheap" → USDC on "rich", expecting 550 back.
pub fn arbitrage_opportunity() -> Opportunity {
    let quote = usdc();
    Opportunity::new(
        OpportunityDraft {
            kind: OpportunityKind::Arbitrage,
            pair: TokenPair::new("0xusdc", "0xweth"),
            legs: vec![
                Leg {
                    venue: VenueId::new("cheap"),
                    token_in: "0xusdc".into(),
                    token_out: "0xweth".into(),
                },
                Leg {
                    venue: VenueId::new("rich"),
                    token_in: "0xweth".into(),
                    token_out: "0xusdc".into(),
                },
            ],
            amount_in: quote.amount(500 * USDC),
            expected_out: quote.amount(550 * USDC),
            expected_profit: 50 * USDC as i128,
            confidence: Decimal::new(9, 1),
            closes_position: None,
        },
        Utc::now(),
        Duration::seconds(30),
    )
}

/// Record and open a WETH position bought for `cost` USDC.
pub fn open_weth_position(ctx: &TradingContext, weth_raw: u128, cost: u128) -> Position {
    let record = TradeRecord {
        id: Uuid::new_v4(),
        opportunity_id: None,
        mode: ctx.mode,
        kind: Some(OpportunityKind::Momentum),
        legs: Vec::new(),
        amount_in: usdc().amount(cost),
        amount_out: weth().amount(weth_raw),
        fees_paid: 0,
        net_result: -(cost as i128),
        realized_pnl: 0,
        outcome: TradeOutcome::Success,
        timestamp: Utc::now(),
        note: None,
    };
    let (stop_loss_value, take_profit_value) = ctx.governor.limits().exit_thresholds(cost);
    ctx.ledger
        .open_position(
            record,
            NewPosition {
                pair: TokenPair::new("0xusdc", "0xweth"),
                holding: weth().amount(weth_raw),
                cost_basis: cost,
                stop_loss_value,
                take_profit_value,
            },
        )
        .unwrap()
}

/// A failed trade that realizes `loss` USDC.
pub fn record_loss(ctx: &TradingContext, loss: u128) {
    let record = TradeRecord {
        id: Uuid::new_v4(),
        opportunity_id: None,
        mode: ctx.mode,
        kind: Some(OpportunityKind::Arbitrage),
        legs: Vec::new(),
        amount_in: usdc().amount(0),
        amount_out: usdc().amount(0),
        fees_paid: loss,
        net_result: -(loss as i128),
        realized_pnl: -(loss as i128),
        outcome: TradeOutcome::Failed,
        timestamp: Utc::now(),
        note: None,
    };
    ctx.ledger.apply_trade(record).unwrap();
}

// ---------------------------------------------------------------------------
// API
// ---------------------------------------------------------------------------

/// App state around `ctx` with default configuration and a detached metrics registry.
pub fn app_state(ctx: TradingContext, api_token: Option<&str>) -> (dexbot::AppState, Arc<std::sync::atomic::AtomicBool>) {
    let mut config = dexbot::config::AppConfig::from_lookup(|_| None).unwrap();
    config.api_token = api_token.map(str::to_string);
    let pause_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let state = dexbot::AppState {
        ctx,
        config,
        metrics_handle: dexbot::metrics::detached_handle(),
        pause_flag: Arc::clone(&pause_flag),
    };
    (state, pause_flag)
}

pub async fn body_json(resp: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}
