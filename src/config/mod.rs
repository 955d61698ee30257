use std::collections::HashSet;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use rust_decimal::Decimal;

use crate::execution::{EngineConfig, ExecutionConfig, RiskLimits, SimulationConfig, SizingStrategy};
use crate::intelligence::{ScannerConfig, SignalConfig};
use crate::models::math::{pct_to_bps, BPS_DENOMINATOR};
use crate::models::token::raw_from_display;
use crate::models::{OpportunityKind, Token, TradingMode};
use crate::routing::RoutingConfig;
use crate::venues::MarketSpec;

const DEFAULT_QUOTE_TOKEN: &str = "USDC:0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48:6";
const DEFAULT_TRACKED_TOKENS: &str = "WETH:0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2:18,\
WBTC:0x2260fac5e5542a773aa44fbcfedf7c193bc2c599:8";
const DEFAULT_VENUES: &str = "uniswap_v2,sushiswap";

/// Static per-run configuration. Amounts configured in dollars are held in
/// quote base units, percentages in basis points.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub api_token: Option<String>,

    pub trading_mode: TradingMode,
    pub quote_token: Token,
    pub tracked_tokens: Vec<Token>,
    /// Addresses usable as the middle token of a two-hop route.
    pub intermediate_tokens: Vec<String>,
    pub venues: Vec<String>,
    pub starting_balance: u128,

    // Risk
    pub max_position_bps: u32,
    pub stop_loss_bps: u32,
    pub take_profit_bps: u32,
    pub daily_loss_limit_bps: u32,
    pub slippage_tolerance_bps: u32,
    pub base_slippage_bps: u32,
    pub min_trade_size: u128,
    pub max_positions_per_pair: usize,
    pub sizing_strategy: SizingStrategy,

    // Scanning
    pub scan_interval: Duration,
    pub enabled_strategies: HashSet<OpportunityKind>,
    pub min_profit: u128,
    pub probe_amount: u128,
    pub history_len: usize,
    pub opportunity_ttl: chrono::Duration,
    pub quote_freshness: chrono::Duration,
    pub momentum_threshold_bps: u32,
    pub whale_liquidity_shift_bps: u32,

    // Execution
    pub max_concurrent_executions: usize,
    pub confirmation_timeout: Duration,
    pub max_submit_retries: u32,
    pub retry_backoff: Duration,

    // Simulation
    pub sim_slippage_bps: u32,
    pub sim_gas_fee: u128,
    pub sim_failure_bps: u32,
    pub sim_seed: u64,
    /// Reference prices of tracked tokens, by symbol, for the simulated pools.
    pub sim_prices: Vec<(String, Decimal)>,
    /// Quote-side depth of every simulated pool.
    pub sim_pool_depth: u128,
    pub sim_volatility_bps: u32,

    // Collaborators
    pub gateway_url: Option<String>,
    pub ledger_path: PathBuf,
    pub activity_capacity: usize,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key/value source. Unset keys take their defaults;
    /// malformed values are errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let trading_mode: TradingMode = var("TRADING_MODE", "simulation")
            .parse()
            .map_err(|e: String| anyhow!(e))
            .context("TRADING_MODE")?;

        let quote_token = Token::parse_entry(&var("QUOTE_TOKEN", DEFAULT_QUOTE_TOKEN))
            .map_err(|e| anyhow!("QUOTE_TOKEN: {e}"))?;
        let tracked_tokens = parse_tokens(&var("TRACKED_TOKENS", DEFAULT_TRACKED_TOKENS))
            .context("TRACKED_TOKENS")?;
        let intermediate_tokens = split_list(&var("INTERMEDIATE_TOKENS", ""))
            .into_iter()
            .map(|s| s.to_lowercase())
            .collect();

        let usd = |key: &str, default: &str| -> anyhow::Result<u128> {
            let value: Decimal = var(key, default)
                .parse()
                .with_context(|| format!("{key} must be a decimal amount"))?;
            raw_from_display(value, quote_token.decimals)
                .ok_or_else(|| anyhow!("{key} must be a non-negative amount"))
        };
        let pct = |key: &str, default: &str| -> anyhow::Result<u32> {
            let value: Decimal = var(key, default)
                .parse()
                .with_context(|| format!("{key} must be a percentage"))?;
            pct_to_bps(value).ok_or_else(|| anyhow!("{key} must be a non-negative percentage"))
        };
        let int = |key: &str, default: &str| -> anyhow::Result<u64> {
            var(key, default)
                .parse()
                .with_context(|| format!("{key} must be a non-negative integer"))
        };

        let bps = |key: &str, default: &str| -> anyhow::Result<u32> {
            let value: u32 = var(key, default)
                .parse()
                .with_context(|| format!("{key} must be a whole number of basis points"))?;
            if value > BPS_DENOMINATOR {
                bail!("{key} must be at most {BPS_DENOMINATOR} bps, got {value}");
            }
            Ok(value)
        };

        let enabled_strategies = split_list(&var("ENABLED_STRATEGIES", "arbitrage,momentum,whale_follow"))
            .iter()
            .map(|s| s.parse::<OpportunityKind>().map_err(|e| anyhow!(e)))
            .collect::<anyhow::Result<HashSet<_>>>()
            .context("ENABLED_STRATEGIES")?;

        let default_ledger = format!("data/ledger-{}.json", trading_mode.as_str());

        Ok(Self {
            host: var("HOST", "0.0.0.0"),
            port: var("PORT", "8080").parse().context("PORT")?,
            api_token: lookup("API_TOKEN").filter(|t| !t.is_empty()),

            trading_mode,
            intermediate_tokens,
            venues: split_list(&var("VENUES", DEFAULT_VENUES)),
            starting_balance: usd("STARTING_BALANCE", "10000")?,

            max_position_bps: pct("MAX_POSITION_SIZE_PCT", "5")?,
            stop_loss_bps: pct("STOP_LOSS_PCT", "5")?,
            take_profit_bps: pct("TAKE_PROFIT_PCT", "10")?,
            daily_loss_limit_bps: pct("DAILY_LOSS_LIMIT_PCT", "10")?,
            slippage_tolerance_bps: pct("SLIPPAGE_TOLERANCE_PCT", "1")?,
            base_slippage_bps: bps("BASE_SLIPPAGE_BPS", "10")?,
            min_trade_size: usd("MIN_TRADE_SIZE_USD", "1")?,
            max_positions_per_pair: int("MAX_POSITIONS_PER_PAIR", "1")? as usize,
            sizing_strategy: SizingStrategy::from_str(&var("SIZING_STRATEGY", "full")),

            scan_interval: Duration::from_secs(int("SCAN_INTERVAL_SECS", "10")?.max(1)),
            enabled_strategies,
            min_profit: usd("MIN_PROFIT_USD", "1")?,
            probe_amount: usd("PROBE_AMOUNT_USD", "500")?,
            history_len: int("PRICE_HISTORY_LEN", "20")? as usize,
            opportunity_ttl: chrono::Duration::seconds(int("OPPORTUNITY_TTL_SECS", "15")? as i64),
            quote_freshness: chrono::Duration::seconds(int("QUOTE_FRESHNESS_SECS", "3")? as i64),
            momentum_threshold_bps: pct("MOMENTUM_THRESHOLD_PCT", "2")?,
            whale_liquidity_shift_bps: pct("WHALE_LIQUIDITY_SHIFT_PCT", "5")?,

            max_concurrent_executions: int("MAX_CONCURRENT_EXECUTIONS", "4")?.max(1) as usize,
            confirmation_timeout: Duration::from_secs(int("CONFIRMATION_TIMEOUT_SECS", "30")?),
            max_submit_retries: int("MAX_SUBMIT_RETRIES", "3")? as u32,
            retry_backoff: Duration::from_millis(int("RETRY_BACKOFF_MS", "500")?),

            sim_slippage_bps: bps("SIM_SLIPPAGE_BPS", "20")?,
            sim_gas_fee: usd("SIM_GAS_FEE_USD", "0.5")?,
            sim_failure_bps: bps("SIM_FAILURE_BPS", "0")?,
            sim_seed: int("SIM_SEED", "7")?,
            sim_prices: parse_prices(&var("SIM_PRICES", "WETH:3000,WBTC:60000")).context("SIM_PRICES")?,
            sim_pool_depth: usd("SIM_POOL_DEPTH_USD", "2000000")?,
            sim_volatility_bps: bps("SIM_VOLATILITY_BPS", "30")?,

            gateway_url: lookup("GATEWAY_URL").filter(|u| !u.is_empty()),
            ledger_path: PathBuf::from(var("LEDGER_PATH", &default_ledger)),
            activity_capacity: int("ACTIVITY_CAPACITY", "1024")?.max(1) as usize,
            telegram_bot_token: lookup("TELEGRAM_BOT_TOKEN").filter(|t| !t.is_empty()),
            telegram_chat_id: lookup("TELEGRAM_CHAT_ID").filter(|t| !t.is_empty()),

            quote_token,
            tracked_tokens,
        })
    }

    /// Returns true if both Telegram settings are present.
    pub fn has_telegram(&self) -> bool {
        self.telegram_bot_token.is_some() && self.telegram_chat_id.is_some()
    }

    pub fn risk_limits(&self) -> RiskLimits {
        RiskLimits {
            max_position_bps: self.max_position_bps,
            stop_loss_bps: self.stop_loss_bps,
            take_profit_bps: self.take_profit_bps,
            daily_loss_limit_bps: self.daily_loss_limit_bps,
            slippage_tolerance_bps: self.slippage_tolerance_bps,
            min_trade_size: self.min_trade_size,
            max_positions_per_pair: self.max_positions_per_pair,
            sizing: self.sizing_strategy,
        }
    }

    pub fn routing_config(&self) -> RoutingConfig {
        RoutingConfig {
            slippage_tolerance_bps: self.slippage_tolerance_bps,
            base_slippage_bps: self.base_slippage_bps,
            intermediates: self.intermediate_tokens.clone(),
            quote_freshness: self.quote_freshness,
            ..RoutingConfig::default()
        }
    }

    pub fn scanner_config(&self) -> ScannerConfig {
        ScannerConfig {
            quote_token: self.quote_token.clone(),
            tracked_tokens: self.tracked_tokens.clone(),
            enabled: self.enabled_strategies.clone(),
            min_profit: self.min_profit,
            probe_amount: self.probe_amount,
            max_position_bps: self.max_position_bps,
            history_len: self.history_len,
            opportunity_ttl: self.opportunity_ttl,
            signals: SignalConfig {
                momentum_threshold_bps: self.momentum_threshold_bps,
                whale_liquidity_shift_bps: self.whale_liquidity_shift_bps,
                ..SignalConfig::default()
            },
        }
    }

    pub fn execution_config(&self) -> ExecutionConfig {
        ExecutionConfig {
            confirmation_timeout: self.confirmation_timeout,
            max_submit_retries: self.max_submit_retries,
            retry_backoff: self.retry_backoff,
            ..ExecutionConfig::default()
        }
    }

    pub fn simulation_config(&self) -> SimulationConfig {
        SimulationConfig {
            slippage_bps: self.sim_slippage_bps,
            gas_fee: self.sim_gas_fee,
            failure_bps: self.sim_failure_bps,
            seed: self.sim_seed,
        }
    }

    /// Simulated pools for every tracked token that has a configured price.
    pub fn market_spec(&self) -> MarketSpec {
        let prices = self
            .tracked_tokens
            .iter()
            .filter_map(|token| {
                self.sim_prices
                    .iter()
                    .find(|(symbol, _)| symbol.eq_ignore_ascii_case(&token.symbol))
                    .map(|(_, price)| (token.clone(), *price))
            })
            .collect();
        MarketSpec {
            quote: self.quote_token.clone(),
            prices,
            depth: self.sim_pool_depth,
            fee_bps: 30,
            gas_cost_quote: self.sim_gas_fee,
            volatility_bps: self.sim_volatility_bps,
            venue_spread_bps: 40,
            seed: self.sim_seed,
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            scan_interval: self.scan_interval,
            max_concurrent_executions: self.max_concurrent_executions,
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_prices(raw: &str) -> anyhow::Result<Vec<(String, Decimal)>> {
    split_list(raw)
        .iter()
        .map(|entry| {
            let (symbol, price) = entry
                .split_once(':')
                .ok_or_else(|| anyhow!("price entry '{entry}' must look like SYMBOL:price"))?;
            let price: Decimal = price.trim().parse().with_context(|| format!("price of {symbol}"))?;
            if price <= Decimal::ZERO {
                return Err(anyhow!("price of {symbol} must be positive"));
            }
            Ok((symbol.trim().to_uppercase(), price))
        })
        .collect()
}

fn parse_tokens(raw: &str) -> anyhow::Result<Vec<Token>> {
    split_list(raw)
        .iter()
        .map(|entry| Token::parse_entry(entry).map_err(|e| anyhow!(e)))
        .collect()
}
