//! Velocity Bot
//!
//! Runs the scalping engine against the paper terminal until interrupted.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use velocity_bot::{RandomWalkFeed, Supervisor, SupervisorOptions};
use velocity_core::config::AppConfig;
use velocity_core::gateway::{PaperGateway, SerializedGateway, TradingGateway};
use velocity_core::store::{ConfigStore, MemoryStore};

#[derive(Parser)]
#[command(name = "velocity-bot")]
#[command(about = "Velocity scalping engine (paper terminal)", long_about = None)]
#[command(version)]
struct Cli {
    /// Emit JSON logs (also enabled by LOG_FORMAT=json)
    #[arg(long)]
    json: bool,

    /// Milliseconds between paper feed ticks
    #[arg(long, default_value_t = 250)]
    feed_interval_ms: u64,

    /// Stop after this many seconds instead of waiting for Ctrl+C
    #[arg(long)]
    run_for_secs: Option<u64>,

    /// Seconds between status log lines
    #[arg(long, default_value_t = 30)]
    status_interval_secs: u64,

    /// Seed for the paper feed
    #[arg(long)]
    seed: Option<u64>,
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "velocity_bot=info,trading_engine=info,risk_manager=info,velocity_core=info".into()
    });

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

async fn deadline(run_for: Option<Duration>) {
    match run_for {
        Some(period) => tokio::time::sleep(period).await,
        None => std::future::pending().await,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let json = cli.json || std::env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false);
    init_logging(json);

    info!("Starting Velocity Bot");
    let config = AppConfig::from_env();

    let store = Arc::new(MemoryStore::new());
    store.seed_config(&config.user_id, config.bot.clone());

    let gateway = Arc::new(SerializedGateway::new(PaperGateway::new(config.paper_balance)));
    let mut feed = match cli.seed {
        Some(seed) => RandomWalkFeed::with_seed(seed),
        None => RandomWalkFeed::from_entropy(),
    };
    feed.install(gateway.inner(), chrono::Utc::now());

    let feed_token = CancellationToken::new();
    let feed_handle = tokio::spawn(feed.run(
        gateway.clone(),
        feed_token.clone(),
        Duration::from_millis(cli.feed_interval_ms.max(1)),
    ));

    let mut options = SupervisorOptions::new(config.user_id.clone(), config.bot.clone());
    options.account_monitor_enabled = config.account_monitor_enabled;
    let store_handle: Arc<dyn ConfigStore> = store.clone();
    let supervisor = Supervisor::new(gateway.clone(), store_handle, options);
    supervisor.start().await?;

    let mut status_ticker = tokio::time::interval(Duration::from_secs(cli.status_interval_secs.max(1)));
    status_ticker.tick().await;
    let run_for = cli.run_for_secs.map(Duration::from_secs);
    let stop = deadline(run_for);
    let signal = shutdown_signal();
    tokio::pin!(stop, signal);

    loop {
        tokio::select! {
            _ = &mut signal => break,
            _ = &mut stop => {
                info!("Run period elapsed");
                break;
            }
            exit = supervisor.locked() => {
                warn!(exit = ?exit, "Account locked for the day, shutting down");
                break;
            }
            _ = status_ticker.tick() => {
                let status = supervisor.status().await;
                info!(
                    scanner = status.scanner_running,
                    risk_monitor = status.risk_monitor_running,
                    account_monitor = status.account_monitor_running,
                    positions = status.positions.len(),
                    open_pl = %status.open_pl,
                    balance = %status.account.as_ref().map(|a| a.balance).unwrap_or_default(),
                    "Engine status"
                );
                debug!(snapshot = %serde_json::to_string(&status)?, "Engine status snapshot");
            }
        }
    }

    if !supervisor.stop().await {
        warn!("Engine loops were aborted during shutdown");
    }
    feed_token.cancel();
    if let Err(e) = feed_handle.await {
        warn!(error = %e, "Paper feed task failed");
    }
    gateway.disconnect().await;

    let trades = store.trades();
    info!(trades = trades.len(), balance = %gateway.inner().balance(), "Velocity Bot stopped");
    Ok(())
}
