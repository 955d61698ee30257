use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{bail, Context};
use tokio::sync::watch;

use dexbot::api::router::create_router;
use dexbot::config::AppConfig;
use dexbot::execution::engine::{self, InFlightPairs, TradingContext};
use dexbot::execution::{RiskGovernor, TradeExecutor};
use dexbot::intelligence::OpportunityScanner;
use dexbot::ledger::{JsonFileStore, Ledger, LedgerStore};
use dexbot::models::{TradingMode, VenueId};
use dexbot::routing::RouteOptimizer;
use dexbot::services::activity::ActivityFeed;
use dexbot::services::notifier::{self, Notifier};
use dexbot::venues::{simulated_market, BlockchainGateway, HttpGateway, HttpQuoteSource, QuoteSource};
use dexbot::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    let metrics_handle = dexbot::metrics::init_metrics()?;
    let addr = format!("{}:{}", config.host, config.port);
    let mode = config.trading_mode;

    let activity = ActivityFeed::new(mode, config.activity_capacity);
    let store: Arc<dyn LedgerStore> = Arc::new(JsonFileStore::new(&config.ledger_path));
    let ledger = load_ledger(&config, store.as_ref())?;
    dexbot::metrics::record_balance(&ledger.balance(), ledger.open_positions().len());

    // --- Venues and gateway ---
    let http = reqwest::Client::new();
    let venues = build_venues(&config, &http)?;
    let gateway: Option<Arc<dyn BlockchainGateway>> = match (mode, &config.gateway_url) {
        (TradingMode::Live, Some(url)) => Some(Arc::new(HttpGateway::new(http.clone(), url))),
        (TradingMode::Live, None) => bail!("GATEWAY_URL is required in live mode"),
        _ => None,
    };
    tracing::info!(
        mode = %mode,
        venues = venues.len(),
        gateway = gateway.is_some(),
        "Venues configured"
    );

    // --- Trading core ---
    let router = Arc::new(RouteOptimizer::new(venues, config.routing_config()));
    let governor = Arc::new(RiskGovernor::new(config.risk_limits()));

    let mut executor = TradeExecutor::new(
        config.quote_token.clone(),
        ledger.clone(),
        Arc::clone(&router),
        Arc::clone(&governor),
        activity.clone(),
    )
    .with_config(config.execution_config())
    .with_simulation(config.simulation_config())
    .with_tokens(&config.tracked_tokens);
    if let Some(gateway) = &gateway {
        executor = executor.with_gateway(Arc::clone(gateway));
    }

    let ctx = TradingContext {
        mode,
        quote_token: config.quote_token.clone(),
        ledger: ledger.clone(),
        governor,
        router: Arc::clone(&router),
        executor: Arc::new(executor),
        activity: activity.clone(),
        gateway,
        store: Some(store),
        in_flight: InFlightPairs::new(),
        opportunity_ttl: config.opportunity_ttl,
    };

    // --- Background tasks ---
    let pause_flag = Arc::new(AtomicBool::new(false));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scanner = OpportunityScanner::new(router, config.scanner_config());
    let engine_task = tokio::spawn(engine::run_trading_engine(
        ctx.clone(),
        scanner,
        config.engine_config(),
        Arc::clone(&pause_flag),
        shutdown_rx,
    ));

    if let (Some(token), Some(chat_id)) = (&config.telegram_bot_token, &config.telegram_chat_id) {
        let notifier = Notifier::new(token.clone(), chat_id.clone());
        let rx = activity.subscribe();
        let quote = config.quote_token.clone();
        tokio::spawn(notifier::run_notifier(notifier, rx, ledger.clone(), quote));
        tracing::info!("Telegram notifier enabled");
    } else {
        tracing::info!("Telegram notifier disabled (TELEGRAM_BOT_TOKEN/TELEGRAM_CHAT_ID not set)");
    }

    // --- HTTP API ---
    let state = AppState {
        ctx: ctx.clone(),
        config,
        metrics_handle,
        pause_flag,
    };
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down trading engine");
    shutdown_tx.send(true).ok();
    if let Err(e) = engine_task.await {
        tracing::error!(error = %e, "Trading engine task failed");
    }
    ctx.persist();

    Ok(())
}

/// Restore the ledger for the configured mode, or start a fresh one.
fn load_ledger(config: &AppConfig, store: &dyn LedgerStore) -> anyhow::Result<Ledger> {
    match store.load()? {
        Some(snapshot) => {
            let ledger = Ledger::restore(snapshot).context("restoring ledger snapshot")?;
            if ledger.mode() != config.trading_mode {
                bail!(
                    "ledger at {} belongs to {} mode, not {}",
                    config.ledger_path.display(),
                    ledger.mode(),
                    config.trading_mode
                );
            }
            let balance = ledger.balance();
            tracing::info!(
                mode = %ledger.mode(),
                current = %balance.current_display(),
                trades = ledger.trades().len(),
                open_positions = ledger.open_positions().len(),
                "Ledger restored"
            );
            Ok(ledger)
        }
        None => {
            tracing::info!(
                mode = %config.trading_mode,
                starting_balance = %config.starting_balance,
                "Starting a fresh ledger"
            );
            Ok(Ledger::new(
                config.trading_mode,
                &config.quote_token,
                config.starting_balance,
                config.daily_loss_limit_bps,
            ))
        }
    }
}

fn build_venues(config: &AppConfig, http: &reqwest::Client) -> anyhow::Result<Vec<Arc<dyn QuoteSource>>> {
    if config.venues.is_empty() {
        bail!("VENUES must name at least one venue");
    }
    if config.trading_mode == TradingMode::Simulation {
        return Ok(simulated_market(&config.market_spec(), &config.venues)
            .into_iter()
            .map(|v| Arc::new(v) as Arc<dyn QuoteSource>)
            .collect());
    }

    let Some(url) = &config.gateway_url else {
        bail!("GATEWAY_URL is required in {} mode", config.trading_mode);
    };
    Ok(config
        .venues
        .iter()
        .map(|name| Arc::new(HttpQuoteSource::new(http.clone(), url, VenueId::new(name.clone()))) as Arc<dyn QuoteSource>)
        .collect())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}
