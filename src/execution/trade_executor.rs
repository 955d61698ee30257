use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use super::fill_simulator::{FillSimulator, SimulatedFill, SimulationConfig};
use super::risk_manager::{check_slippage, Authorization, RiskGovernor, RiskViolation};
use crate::ledger::{CommitOutcome, Ledger, LedgerError, NewPosition, TradeCommit};
use crate::models::math::{mul_div, scale_signed, signed_diff};
use crate::models::token::display_value;
use crate::models::{
    Balance, ExecutedLeg, ExitReason, Opportunity, OpportunityKind, Position, Token, TokenAmount, TokenPair,
    TradeOutcome, TradeRecord, TradingMode,
};
use crate::routing::{Route, RouteError, RouteOptimizer};
use crate::services::activity::ActivityFeed;
use crate::venues::{BlockchainGateway, GatewayError, QuoteError, SwapLeg, TxHash};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    Pending,
    Quoting,
    Approving,
    Submitting,
    Confirming,
    Committed,
    Failed,
    PartiallyFailed,
}

impl ExecutionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionState::Pending => "pending",
            ExecutionState::Quoting => "quoting",
            ExecutionState::Approving => "approving",
            ExecutionState::Submitting => "submitting",
            ExecutionState::Confirming => "confirming",
            ExecutionState::Committed => "committed",
            ExecutionState::Failed => "failed",
            ExecutionState::PartiallyFailed => "partially_failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionState::Committed | ExecutionState::Failed | ExecutionState::PartiallyFailed
        )
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("quote unavailable: {0}")]
    QuoteUnavailable(QuoteError),

    #[error("no route found: {0}")]
    NoRouteFound(String),

    #[error("risk rejected: {0}")]
    RiskRejected(#[from] RiskViolation),

    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("confirmation timed out after {0:?}")]
    Timeout(Duration),

    #[error("partial execution: {confirmed}/{total} legs confirmed ({cause})")]
    PartialExecution {
        confirmed: usize,
        total: usize,
        cause: String,
    },

    #[error("opportunity {0} expired")]
    Expired(Uuid),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("no blockchain gateway configured for live trading")]
    NoGateway,
}

impl From<RouteError> for ExecutionError {
    fn from(err: RouteError) -> Self {
        match err {
            RouteError::QuoteUnavailable(e) => ExecutionError::QuoteUnavailable(e),
            RouteError::SlippageExceeded { actual_bps, max_bps } => {
                ExecutionError::RiskRejected(RiskViolation::SlippageTooHigh { actual_bps, max_bps })
            }
            other => ExecutionError::NoRouteFound(other.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    pub confirmation_timeout: Duration,
    pub max_submit_retries: u32,
    /// First retry delay; doubles on every further attempt.
    pub retry_backoff: Duration,
    /// How long a submitted leg stays valid on-chain.
    pub leg_deadline: chrono::Duration,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            confirmation_timeout: Duration::from_secs(30),
            max_submit_retries: 3,
            retry_backoff: Duration::from_millis(500),
            leg_deadline: chrono::Duration::seconds(60),
        }
    }
}

/// Everything that happened to one opportunity.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub opportunity_id: Uuid,
    pub kind: OpportunityKind,
    pub final_state: ExecutionState,
    pub transitions: Vec<ExecutionState>,
    pub record: Option<TradeRecord>,
    pub opened: Option<Position>,
    pub closed: Option<Position>,
    pub error: Option<ExecutionError>,
    pub balance_after: Balance,
}

impl ExecutionReport {
    pub fn is_committed(&self) -> bool {
        self.final_state == ExecutionState::Committed
    }
}

struct Attempt {
    opportunity_id: Uuid,
    transitions: Vec<ExecutionState>,
}

impl Attempt {
    fn new(opportunity_id: Uuid) -> Self {
        Self {
            opportunity_id,
            transitions: Vec::new(),
        }
    }

    fn transition(&mut self, state: ExecutionState) {
        tracing::debug!(opportunity_id = %self.opportunity_id, state = %state, "Execution state transition");
        self.transitions.push(state);
    }
}

struct LegFill {
    amount_out: u128,
    fee_paid: u128,
    tx_hash: String,
}

struct LegFailure {
    fee_paid: u128,
    error: ExecutionError,
}

impl LegFailure {
    fn free(error: ExecutionError) -> Self {
        Self { fee_paid: 0, error }
    }
}

#[derive(Default)]
struct LegsOutcome {
    executed: Vec<ExecutedLeg>,
    fees: u128,
    failure: Option<ExecutionError>,
}

struct Accounting {
    net_result: i128,
    realized_pnl: i128,
    open: Option<NewPosition>,
    close: Option<(Uuid, ExitReason)>,
}

struct Settled {
    state: ExecutionState,
    record: TradeRecord,
    commit: CommitOutcome,
    failure: Option<ExecutionError>,
}

/// Drives one approved opportunity from re-quote to ledger commit.
///
/// Legs run strictly in order: leg k+1 is only submitted once leg k has
/// confirmed, and it spends exactly what leg k delivered. Simulation and Paper
/// fills come from the `FillSimulator`; Live fills come from the gateway.
pub struct TradeExecutor {
    mode: TradingMode,
    quote: Token,
    ledger: Ledger,
    router: Arc<RouteOptimizer>,
    governor: Arc<RiskGovernor>,
    activity: ActivityFeed,
    gateway: Option<Arc<dyn BlockchainGateway>>,
    simulator: FillSimulator,
    config: ExecutionConfig,
    tokens: HashMap<String, Token>,
}

impl TradeExecutor {
    pub fn new(
        quote: Token,
        ledger: Ledger,
        router: Arc<RouteOptimizer>,
        governor: Arc<RiskGovernor>,
        activity: ActivityFeed,
    ) -> Self {
        Self {
            mode: ledger.mode(),
            quote,
            ledger,
            router,
            governor,
            activity,
            gateway: None,
            simulator: FillSimulator::new(SimulationConfig::default()),
            config: ExecutionConfig::default(),
            tokens: HashMap::new(),
        }
    }

    pub fn with_gateway(mut self, gateway: Arc<dyn BlockchainGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn with_simulation(mut self, config: SimulationConfig) -> Self {
        self.simulator = FillSimulator::new(config);
        self
    }

    pub fn with_config(mut self, config: ExecutionConfig) -> Self {
        self.config = config;
        self
    }

    /// Tokens whose decimals may be needed for positions left by a partial fill.
    pub fn with_tokens(mut self, tokens: &[Token]) -> Self {
        for token in tokens {
            self.tokens.insert(token.address.clone(), token.clone());
        }
        self
    }

    pub fn mode(&self) -> TradingMode {
        self.mode
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Run `opportunity` at `approved_amount` of its input token. Never panics
    /// and never returns early without a terminal state in the report.
    pub async fn execute(&self, opportunity: &Opportunity, approved_amount: u128) -> ExecutionReport {
        let started = Instant::now();
        let mut attempt = Attempt::new(opportunity.id);

        let result = self.run(opportunity, approved_amount, &mut attempt).await;
        histogram!("execution_latency_seconds").record(started.elapsed().as_secs_f64());

        self.finish(opportunity, attempt, result)
    }

    async fn run(
        &self,
        opportunity: &Opportunity,
        approved_amount: u128,
        attempt: &mut Attempt,
    ) -> Result<Settled, ExecutionError> {
        attempt.transition(ExecutionState::Pending);
        let now = Utc::now();
        if opportunity.is_expired(now) {
            return Err(ExecutionError::Expired(opportunity.id));
        }

        attempt.transition(ExecutionState::Quoting);
        let route = self.router.requote(&opportunity.legs, approved_amount).await?;

        attempt.transition(ExecutionState::Approving);
        self.approve(opportunity, approved_amount, &route, now)?;

        let legs = self.run_legs(&route, approved_amount, attempt).await;
        self.settle(opportunity, approved_amount, route.legs.len(), legs)
    }

    /// Fresh numbers must still pass the slippage check and the governor.
    /// Forced exits go through regardless.
    fn approve(
        &self,
        opportunity: &Opportunity,
        amount_in: u128,
        route: &Route,
        now: DateTime<Utc>,
    ) -> Result<(), ExecutionError> {
        if opportunity.kind == OpportunityKind::ForcedExit {
            return Ok(());
        }

        let expected_out = rescale(opportunity.expected_out.raw, amount_in, opportunity.amount_in.raw);
        let slippage_bps = check_slippage(expected_out, route.amount_out, self.governor.limits())?;

        let profit = if opportunity.kind == OpportunityKind::Arbitrage {
            signed_diff(route.net_out(), amount_in)
        } else {
            scale_signed(opportunity.expected_profit, opportunity.amount_in.raw, amount_in)
        };
        if opportunity.kind == OpportunityKind::Arbitrage && profit <= 0 {
            return Err(RiskViolation::Unprofitable { expected: profit }.into());
        }

        let fresh = opportunity.resized(amount_in, route.amount_out, profit);
        match self.governor.authorize_at(&fresh, &self.ledger, now) {
            Authorization::Approved { amount } if amount >= amount_in => {
                tracing::debug!(
                    opportunity_id = %opportunity.id,
                    slippage_bps,
                    expected_profit = %profit,
                    "Execution approved on fresh quotes"
                );
                Ok(())
            }
            Authorization::Approved { amount } => Err(RiskViolation::SizeCapShrank {
                approved: amount_in,
                allowed: amount,
            }
            .into()),
            Authorization::Rejected(violation) => Err(violation.into()),
        }
    }

    async fn run_legs(&self, route: &Route, amount_in: u128, attempt: &mut Attempt) -> LegsOutcome {
        let mut outcome = LegsOutcome::default();
        let mut amount = amount_in;

        for leg in &route.legs {
            let swap = SwapLeg {
                venue: leg.venue.clone(),
                token_in: leg.token_in.clone(),
                token_out: leg.token_out.clone(),
                amount_in: amount,
                min_acceptable_amount_out: rescale(leg.min_acceptable_amount_out, amount, leg.amount_in),
                deadline: Utc::now() + self.config.leg_deadline,
            };
            let quoted_out = rescale(leg.amount_out, amount, leg.amount_in);

            attempt.transition(ExecutionState::Submitting);
            match self.run_leg(&swap, quoted_out, attempt).await {
                Ok(fill) => {
                    tracing::info!(
                        opportunity_id = %attempt.opportunity_id,
                        venue = %swap.venue,
                        amount_in = %swap.amount_in,
                        amount_out = %fill.amount_out,
                        tx_hash = %fill.tx_hash,
                        "Leg confirmed"
                    );
                    outcome.fees = outcome.fees.saturating_add(fill.fee_paid);
                    amount = fill.amount_out;
                    outcome.executed.push(ExecutedLeg {
                        venue: swap.venue,
                        token_in: swap.token_in,
                        token_out: swap.token_out,
                        amount_in: swap.amount_in,
                        amount_out: fill.amount_out,
                        fee_paid: fill.fee_paid,
                        tx_hash: Some(fill.tx_hash),
                    });
                }
                Err(failure) => {
                    tracing::warn!(
                        opportunity_id = %attempt.opportunity_id,
                        venue = %swap.venue,
                        error = %failure.error,
                        fee_paid = %failure.fee_paid,
                        "Leg failed"
                    );
                    outcome.fees = outcome.fees.saturating_add(failure.fee_paid);
                    outcome.failure = Some(failure.error);
                    break;
                }
            }
        }
        outcome
    }

    async fn run_leg(&self, swap: &SwapLeg, quoted_out: u128, attempt: &mut Attempt) -> Result<LegFill, LegFailure> {
        if !self.mode.is_live() {
            attempt.transition(ExecutionState::Confirming);
            return match self.simulator.fill(swap, quoted_out) {
                SimulatedFill::Filled {
                    amount_out,
                    fee_paid,
                    tx_hash,
                } => Ok(LegFill {
                    amount_out,
                    fee_paid,
                    tx_hash,
                }),
                SimulatedFill::Reverted { fee_paid, reason } => Err(LegFailure {
                    fee_paid,
                    error: GatewayError::Reverted(reason).into(),
                }),
            };
        }

        let gateway = self
            .gateway
            .as_ref()
            .ok_or_else(|| LegFailure::free(ExecutionError::NoGateway))?;
        let tx_hash = self
            .submit_with_retry(gateway.as_ref(), swap)
            .await
            .map_err(|e| LegFailure::free(e.into()))?;

        attempt.transition(ExecutionState::Confirming);
        let timeout = self.config.confirmation_timeout;
        match tokio::time::timeout(timeout, gateway.confirm_swap(&tx_hash)).await {
            Err(_) => Err(LegFailure::free(ExecutionError::Timeout(timeout))),
            Ok(Err(e)) => Err(LegFailure::free(e.into())),
            Ok(Ok(receipt)) if !receipt.confirmed => Err(LegFailure {
                fee_paid: receipt.fee_paid,
                error: GatewayError::Reverted(format!("{} reverted on-chain", receipt.tx_hash)).into(),
            }),
            Ok(Ok(receipt)) => Ok(LegFill {
                amount_out: receipt.amount_out,
                fee_paid: receipt.fee_paid,
                tx_hash: receipt.tx_hash.0,
            }),
        }
    }

    /// Retries transient submission failures with exponential backoff.
    /// Reverts and rejections are returned immediately.
    async fn submit_with_retry(
        &self,
        gateway: &dyn BlockchainGateway,
        swap: &SwapLeg,
    ) -> Result<TxHash, GatewayError> {
        let mut delay = self.config.retry_backoff;
        let mut attempt = 0u32;
        loop {
            match gateway.submit_swap(swap).await {
                Ok(tx_hash) => return Ok(tx_hash),
                Err(e) if e.is_transient() && attempt < self.config.max_submit_retries => {
                    attempt += 1;
                    tracing::warn!(
                        venue = %swap.venue,
                        attempt,
                        max_retries = self.config.max_submit_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Swap submission failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn settle(
        &self,
        opportunity: &Opportunity,
        amount_in: u128,
        total_legs: usize,
        legs: LegsOutcome,
    ) -> Result<Settled, ExecutionError> {
        let now = Utc::now();
        let confirmed = legs.executed.len();

        let (state, outcome, accounting, amount_out) = match (&legs.failure, legs.executed.last()) {
            // Nothing confirmed and nothing spent: the ledger does not move.
            (Some(error), None) if legs.fees == 0 => return Err(error.clone()),
            (Some(_), None) => {
                let fees = signed(legs.fees);
                (
                    ExecutionState::Failed,
                    TradeOutcome::Failed,
                    Accounting {
                        net_result: -fees,
                        realized_pnl: -fees,
                        open: None,
                        close: None,
                    },
                    self.quote.amount(0),
                )
            }
            (failure, Some(last)) => {
                let held = TokenAmount::new(
                    &last.token_out,
                    last.amount_out,
                    self.decimals_of(&last.token_out, opportunity),
                );
                let accounting = self.account(opportunity, amount_in, &held, legs.fees);
                if failure.is_some() {
                    (ExecutionState::PartiallyFailed, TradeOutcome::PartialFailure, accounting, held)
                } else {
                    (ExecutionState::Committed, TradeOutcome::Success, accounting, held)
                }
            }
            (None, None) => {
                return Err(ExecutionError::NoRouteFound(format!(
                    "opportunity {} has no legs",
                    opportunity.id
                )))
            }
        };

        let note = legs.failure.as_ref().map(|e| match state {
            ExecutionState::PartiallyFailed => format!("{confirmed}/{total_legs} legs confirmed: {e}"),
            _ => e.to_string(),
        });
        let record = TradeRecord {
            id: Uuid::new_v4(),
            opportunity_id: Some(opportunity.id),
            mode: self.mode,
            kind: Some(opportunity.kind),
            legs: legs.executed,
            amount_in: opportunity.amount_in.with_raw(amount_in),
            amount_out,
            fees_paid: legs.fees,
            net_result: accounting.net_result,
            realized_pnl: accounting.realized_pnl,
            outcome,
            timestamp: now,
            note,
        };

        let commit = self
            .ledger
            .commit(TradeCommit {
                record: record.clone(),
                open: accounting.open,
                close: accounting.close,
            })
            .map_err(|e| {
                tracing::error!(
                    opportunity_id = %opportunity.id,
                    trade_id = %record.id,
                    confirmed_legs = confirmed,
                    error = %e,
                    "Ledger refused execution result"
                );
                ExecutionError::Ledger(e)
            })?;

        let failure = legs.failure.map(|cause| match state {
            ExecutionState::PartiallyFailed => ExecutionError::PartialExecution {
                confirmed,
                total: total_legs,
                cause: cause.to_string(),
            },
            _ => cause,
        });

        Ok(Settled {
            state,
            record,
            commit,
            failure,
        })
    }

    /// Cash and PnL effect of ending up with `held` after spending `amount_in`.
    fn account(&self, opportunity: &Opportunity, amount_in: u128, held: &TokenAmount, fees: u128) -> Accounting {
        let quote = self.quote.address.as_str();
        let fees = signed(fees);
        let spent_quote = opportunity.token_in() == quote;
        let got_quote = held.token == quote;

        match (spent_quote, got_quote) {
            (true, true) => {
                let net = signed_diff(held.raw, amount_in).saturating_sub(fees);
                Accounting {
                    net_result: net,
                    realized_pnl: net,
                    open: None,
                    close: None,
                }
            }
            (true, false) => Accounting {
                net_result: signed(amount_in).saturating_neg().saturating_sub(fees),
                realized_pnl: -fees,
                open: Some(self.new_position(held, amount_in)),
                close: None,
            },
            (false, got_quote) => {
                let position = self.position_for(opportunity);
                let cost_basis = position.as_ref().map(|p| p.cost_basis).unwrap_or(0);
                if got_quote {
                    let net = signed(held.raw).saturating_sub(fees);
                    let reason = opportunity.exit_reason.unwrap_or(ExitReason::Manual);
                    Accounting {
                        net_result: net,
                        realized_pnl: net.saturating_sub(signed(cost_basis)),
                        open: None,
                        close: position.map(|p| (p.id, reason)),
                    }
                } else {
                    Accounting {
                        net_result: -fees,
                        realized_pnl: -fees,
                        open: Some(self.new_position(held, cost_basis)),
                        close: position.map(|p| (p.id, ExitReason::Rolled)),
                    }
                }
            }
        }
    }

    fn new_position(&self, held: &TokenAmount, cost_basis: u128) -> NewPosition {
        let (stop_loss_value, take_profit_value) = self.governor.limits().exit_thresholds(cost_basis);
        NewPosition {
            pair: TokenPair::new(&self.quote.address, &held.token),
            holding: held.clone(),
            cost_basis,
            stop_loss_value,
            take_profit_value,
        }
    }

    /// The open position an opportunity spends from: the one it names, or else
    /// the first open position holding its input token.
    fn position_for(&self, opportunity: &Opportunity) -> Option<Position> {
        let named = opportunity
            .closes_position
            .and_then(|id| self.ledger.position(id))
            .filter(Position::is_open);
        let found = named.or_else(|| {
            self.ledger
                .open_positions()
                .into_iter()
                .find(|p| p.holding.token == opportunity.token_in())
        });
        if found.is_none() {
            tracing::warn!(
                opportunity_id = %opportunity.id,
                token = opportunity.token_in(),
                "No open position backs this sale, treating cost basis as zero"
            );
        }
        found
    }

    fn decimals_of(&self, token: &str, opportunity: &Opportunity) -> u8 {
        if token == self.quote.address {
            self.quote.decimals
        } else if token == opportunity.expected_out.token {
            opportunity.expected_out.decimals
        } else if token == opportunity.amount_in.token {
            opportunity.amount_in.decimals
        } else {
            self.tokens.get(token).map(|t| t.decimals).unwrap_or(18)
        }
    }

    fn finish(
        &self,
        opportunity: &Opportunity,
        mut attempt: Attempt,
        result: Result<Settled, ExecutionError>,
    ) -> ExecutionReport {
        let kind = opportunity.kind;
        let (final_state, record, commit, error) = match result {
            Ok(settled) => (settled.state, Some(settled.record), Some(settled.commit), settled.failure),
            Err(e) => (ExecutionState::Failed, None, None, Some(e)),
        };
        attempt.transition(final_state);

        match (&final_state, &record, &error) {
            (ExecutionState::Committed, Some(record), _) => {
                counter!("trades_committed_total", "kind" => kind.as_str()).increment(1);
                if kind == OpportunityKind::ForcedExit {
                    counter!("forced_exits_total").increment(1);
                }
                tracing::info!(
                    opportunity_id = %opportunity.id,
                    trade_id = %record.id,
                    kind = %kind,
                    net_result = %record.net_result,
                    realized_pnl = %record.realized_pnl,
                    "Trade committed"
                );
                self.activity.trade_executed(
                    format!(
                        "{kind} trade committed: net {} {}, realized {}",
                        self.display(record.net_result),
                        self.quote.symbol,
                        self.display(record.realized_pnl)
                    ),
                    record.id,
                );
            }
            (ExecutionState::PartiallyFailed, Some(record), error) => {
                counter!("trades_partial_total", "kind" => kind.as_str()).increment(1);
                let cause = error.as_ref().map(|e| e.to_string()).unwrap_or_default();
                tracing::error!(
                    opportunity_id = %opportunity.id,
                    trade_id = %record.id,
                    held = %record.amount_out,
                    cause = %cause,
                    "Trade partially failed, holding intermediate tokens"
                );
                self.activity.error(
                    format!("{kind} trade partially failed, now holding {}: {cause}", record.amount_out),
                    Some(record.id),
                );
            }
            (_, record, Some(error)) => self.report_failure(opportunity, record.as_ref(), error),
            _ => {}
        }

        let balance_after = commit
            .as_ref()
            .map(|c| c.balance.clone())
            .unwrap_or_else(|| self.ledger.balance());
        if record.is_some() {
            crate::metrics::record_balance(&balance_after, self.ledger.open_positions().len());
        }

        ExecutionReport {
            opportunity_id: opportunity.id,
            kind,
            final_state,
            transitions: attempt.transitions,
            record,
            opened: commit.as_ref().and_then(|c| c.opened.clone()),
            closed: commit.and_then(|c| c.closed),
            error,
            balance_after,
        }
    }

    fn report_failure(&self, opportunity: &Opportunity, record: Option<&TradeRecord>, error: &ExecutionError) {
        let kind = opportunity.kind;
        match error {
            ExecutionError::RiskRejected(violation) => {
                counter!("risk_rejections_total", "stage" => "execution").increment(1);
                tracing::warn!(opportunity_id = %opportunity.id, kind = %kind, reason = %violation, "Execution rejected");
                self.activity
                    .warning(format!("{kind} opportunity rejected before submission: {violation}"));
            }
            ExecutionError::QuoteUnavailable(_) | ExecutionError::NoRouteFound(_) | ExecutionError::Expired(_) => {
                tracing::info!(opportunity_id = %opportunity.id, kind = %kind, reason = %error, "Opportunity dropped");
                self.activity.info(format!("{kind} opportunity dropped: {error}"));
            }
            _ => {
                counter!("trades_failed_total", "kind" => kind.as_str()).increment(1);
                tracing::error!(
                    opportunity_id = %opportunity.id,
                    kind = %kind,
                    mode = %self.mode,
                    error = %error,
                    "Trade failed"
                );
                self.activity
                    .error(format!("{kind} trade failed: {error}"), record.map(|r| r.id));
            }
        }
    }

    fn display(&self, value: i128) -> String {
        let magnitude = display_value(value.unsigned_abs(), self.quote.decimals);
        if value < 0 {
            format!("-{}", magnitude.normalize())
        } else {
            magnitude.normalize().to_string()
        }
    }
}

/// `value` quoted for `quoted_in`, re-expressed for `actual_in`.
fn rescale(value: u128, actual_in: u128, quoted_in: u128) -> u128 {
    if actual_in == quoted_in {
        return value;
    }
    mul_div(value, actual_in, quoted_in).unwrap_or(0)
}

fn signed(value: u128) -> i128 {
    i128::try_from(value).unwrap_or(i128::MAX)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
