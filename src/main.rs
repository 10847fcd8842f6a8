use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use fairmm::account::state::AccountDataState;
use fairmm::config::Settings;
use fairmm::engine::pricing::PricingEngine;
use fairmm::engine::risk::RiskGuard;
use fairmm::market_data::adapters::binance::BinanceAdapter;
use fairmm::market_data::adapters::{MarketEvent, PriceFeedAdapter};
use fairmm::market_data::normaliser::Normaliser;
use fairmm::market_data::router::run_price_router;
use fairmm::market_data::state::MarketDataState;
use fairmm::monitor::{self, MonitorState};
use fairmm::shutdown::{self, listen_for_shutdown};
use fairmm::strategy::order_manager::{OrderManager, OrderManagerConfig};
use fairmm::strategy::quoting::{QuotingConfig, QuotingLoop};
use fairmm::telemetry;
use fairmm::venue::poller::spawn_position_poller;
use fairmm::venue::roxom::RoxomClient;
use fairmm::venue::user_feed::RoxomUserFeed;
use fairmm::venue::VenueClient;

#[derive(Debug, Parser)]
#[command(name = "fairmm", version, about = "Ratio-priced market maker")]
struct Cli {
    /// TOML config file (default: ./fairmm.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter, e.g. "info,fairmm=debug" (RUST_LOG takes precedence)
    #[arg(long)]
    log_filter: Option<String>,

    /// Print the resolved configuration and exit
    #[arg(long)]
    print_config: bool,
}

const TASK_DRAIN: Duration = Duration::from_secs(5);

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok(); // load .env

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("loading configuration")?;
    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&settings.redacted())?);
        return Ok(());
    }

    let _log_guard = telemetry::init_tracing(
        cli.log_filter.as_deref().unwrap_or(&settings.logging.filter),
        settings.logging.file.as_deref(),
    )?;
    telemetry::init_metrics(settings.metrics.port)?;
    if settings.venue.api_key.is_empty() {
        anyhow::bail!("venue.api_key is not set (FMM_VENUE__API_KEY)");
    }

    info!(
        symbol = %settings.venue.symbol,
        reference = %format!("{}/{}", settings.feed.ref_base, settings.feed.ref_quote),
        spread_bps = %settings.quoting.spread_bps,
        size = %settings.quoting.order_size,
        "fairmm starting"
    );

    let (trigger, shutdown) = shutdown::channel();
    tokio::spawn(listen_for_shutdown(trigger.clone()));

    let market = MarketDataState::new();
    let account = AccountDataState::new();
    let venue: Arc<dyn VenueClient> = Arc::new(RoxomClient::new(&settings.venue)?);
    let orders = Arc::new(OrderManager::new(
        Arc::clone(&venue),
        account.clone(),
        OrderManagerConfig {
            symbol: settings.venue.symbol.clone(),
            call_timeout: settings.quoting.call_timeout(),
            pending_ttl: settings.quoting.pending_ttl(),
        },
    ));
    let risk = Arc::new(RiskGuard::new(settings.risk.limits()));

    // reference prices: adapter -> router -> MarketDataState
    let (tx, rx) = mpsc::channel::<MarketEvent>(1024);
    let adapter = BinanceAdapter::new(&settings.feed);
    let mut tasks = vec![
        tokio::spawn({
            let shutdown = shutdown.clone();
            async move { adapter.run(tx, shutdown).await }
        }),
        tokio::spawn(run_price_router(rx, market.clone())),
    ];

    // venue order feed + position poll
    let user_feed = RoxomUserFeed::new(&settings.venue);
    tasks.push(tokio::spawn({
        let orders = Arc::clone(&orders);
        let shutdown = shutdown.clone();
        async move { user_feed.run(orders, shutdown).await }
    }));
    tasks.push(spawn_position_poller(
        Arc::clone(&venue),
        account.clone(),
        settings.venue.symbol.clone(),
        Duration::from_millis(settings.position.poll_interval_ms),
        settings.quoting.call_timeout(),
        shutdown.clone(),
    ));

    if let Err(e) = orders.hydrate().await {
        warn!(error = %e, "Could not load open orders, continuing without hydration");
    }

    let pricing = PricingEngine::new(
        &settings.feed.ref_base,
        &settings.feed.ref_quote,
        Normaliser::new(settings.quoting.tick_size),
    );
    let quoter = QuotingLoop::new(
        market.clone(),
        pricing,
        Arc::clone(&orders),
        Arc::clone(&risk),
        QuotingConfig {
            spread_bps: settings.quoting.spread_bps,
            order_size: settings.quoting.order_size,
            interval: settings.quoting.interval(),
            skew: settings.quoting.skew(),
        },
    );

    if settings.monitor.enabled {
        let addr = settings.monitor.addr()?;
        let state = Arc::new(MonitorState {
            symbol: settings.venue.symbol.clone(),
            market: market.clone(),
            account: account.clone(),
            risk: Arc::clone(&risk),
            quoter: quoter.status(),
            started: Instant::now(),
        });
        let shutdown = shutdown.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = monitor::serve(addr, state, shutdown).await {
                error!(error = %e, "Monitor server failed");
            }
        }));
    }

    let session = quoter.run_until_shutdown(shutdown.clone()).await;
    if let Some(reason) = &session.halt_reason {
        warn!(%reason, "Session ended after a trading halt");
    }

    trigger.trigger();
    for task in tasks {
        if tokio::time::timeout(TASK_DRAIN, task).await.is_err() {
            warn!("Background task did not stop in time");
        }
    }

    if !session.is_clean() {
        anyhow::bail!("orders remained whose cancellation could not be confirmed");
    }
    info!("fairmm stopped");
    Ok(())
}
