//! Integration tests for component interactions.
//!
//! These drive the full supervisor against the paper terminal and the
//! in-memory store.

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::{Duration, Instant};
use velocity_bot::{RandomWalkFeed, Supervisor, SupervisorOptions};
use velocity_core::config::{BotConfig, BotConfigUpdate};
use velocity_core::gateway::{PaperGateway, SerializedGateway, TradingGateway};
use velocity_core::store::{ConfigStore, MemoryStore};
use velocity_core::types::{Candle, NotificationLevel, SymbolInfo, Timeframe, TradeActionKind};

const USER: &str = "integration";
const SYMBOL: &str = "EURUSD";

fn eurusd() -> SymbolInfo {
    SymbolInfo {
        name: SYMBOL.to_string(),
        point: 0.00001,
        tick_value: 1.0,
        volume_min: Decimal::new(1, 2),
        volume_max: Decimal::new(100, 0),
        volume_step: Decimal::new(1, 2),
    }
}

/// Steady minute downtrend: close below the SMA with a depressed RSI.
fn downtrend(n: usize) -> Vec<Candle> {
    let start = Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap();
    (0..n)
        .map(|i| {
            let close = 1.1 - 0.0005 * i as f64;
            Candle::new(
                start + ChronoDuration::minutes(i as i64),
                close + 0.0005,
                close + 0.0007,
                close - 0.0002,
                close,
            )
        })
        .collect()
}

fn fast_config() -> BotConfig {
    let mut config = BotConfig::default();
    config.strategy.symbols = vec![SYMBOL.to_string()];
    config.strategy.check_interval_secs = 0.02;
    config.strategy.profit_check_interval_secs = 0.02;
    config.risk.monitor_interval_ms = 20;
    config.volatility.enabled = false;
    config
}

struct Harness {
    supervisor: Supervisor<PaperGateway>,
    store: Arc<MemoryStore>,
}

impl Harness {
    fn new(config: BotConfig) -> Self {
        let paper = PaperGateway::new(Decimal::new(1000, 0));
        paper.add_symbol(eurusd());
        paper.set_tick(SYMBOL, 1.07990, 1.08000);
        paper.set_candles(SYMBOL, Timeframe::M1, downtrend(40));

        let store = Arc::new(MemoryStore::new());
        store.seed_config(USER, config.clone());
        let shared: Arc<dyn ConfigStore> = store.clone();
        let supervisor = Supervisor::new(
            Arc::new(SerializedGateway::new(paper)),
            shared,
            SupervisorOptions::new(USER, config),
        );
        Self { supervisor, store }
    }

    fn paper(&self) -> &PaperGateway {
        self.supervisor.gateway().inner()
    }
}

async fn wait_until<F: Fn() -> bool>(timeout: Duration, cond: F) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

#[tokio::test]
async fn test_entry_then_small_profit_exit() {
    let h = Harness::new(fast_config());
    h.supervisor.start().await.unwrap();

    assert!(wait_until(Duration::from_secs(2), || h.paper().orders_sent() == 1).await);
    let positions = h.supervisor.gateway().positions().await;
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].volume, Decimal::new(1, 2));

    // One order per closed candle, even across many scan cycles
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.paper().orders_sent(), 1);

    h.paper().set_position_profit(positions[0].ticket, Decimal::new(3, 0));
    assert!(wait_until(Duration::from_secs(2), || !h.store.trades().is_empty()).await);

    let trades = h.store.trades();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].action, TradeActionKind::SmallProfitClose);
    assert_eq!(trades[0].profit, Decimal::new(3, 0));
    assert_eq!(h.paper().balance(), Decimal::new(1003, 0));
    assert!(h.supervisor.gateway().positions().await.is_empty());

    assert!(h.supervisor.stop().await);
    assert!(!h.store.last_status().unwrap().is_running);
}

#[tokio::test]
async fn test_config_update_takes_effect_without_restart() {
    let mut config = fast_config();
    config.strategy.enabled = false;
    let h = Harness::new(config);
    h.supervisor.start().await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.paper().orders_sent(), 0);

    h.store.update_config(
        USER,
        &BotConfigUpdate {
            strategy_enabled: Some(true),
            ..Default::default()
        },
    );
    assert!(wait_until(Duration::from_secs(2), || h.paper().orders_sent() == 1).await);

    assert!(h.supervisor.stop().await);
}

#[tokio::test]
async fn test_store_outage_keeps_last_known_config() {
    let h = Harness::new(fast_config());
    h.supervisor.start().await.unwrap();
    assert!(wait_until(Duration::from_secs(2), || h.paper().orders_sent() == 1).await);

    h.store.set_reads_failing(true);
    let before = h.store.statuses().len();
    // The exit loop keeps publishing heartbeats on the cached config
    assert!(wait_until(Duration::from_secs(2), || h.store.statuses().len() > before + 3).await);
    assert!(h.supervisor.is_running());

    assert!(h.supervisor.stop().await);
}

#[tokio::test]
async fn test_daily_profit_lock_deactivates() {
    let mut config = fast_config();
    config.strategy.enabled = false;
    let h = Harness::new(config);
    h.supervisor.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;

    // 2.5% over the 1000 day-start balance
    h.paper().set_balance(Decimal::new(1025, 0));
    let exit = tokio::time::timeout(Duration::from_secs(2), h.supervisor.locked())
        .await
        .unwrap();
    assert!(exit.is_terminal());

    assert_eq!(h.store.is_active(USER), Some(false));
    let notes = h.store.notifications();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].level, NotificationLevel::Success);
    assert_eq!(
        notes[0].message,
        "SUCCESS: Profit target reached (2.50%). Positions closed. Bot paused for the day."
    );
    assert!(h.supervisor.stop().await);
}

#[tokio::test]
async fn test_profit_lock_halts_trading() {
    // Live-candle signals fire every cycle until the engine stops
    let mut config = fast_config();
    config.strategy.live_candle_signals = true;
    let h = Harness::new(config);
    h.supervisor.start().await.unwrap();
    assert!(wait_until(Duration::from_secs(2), || h.paper().orders_sent() >= 2).await);

    h.paper().set_balance(Decimal::new(1100, 0));
    let exit = tokio::time::timeout(Duration::from_secs(2), h.supervisor.locked())
        .await
        .unwrap();
    assert!(exit.is_terminal());
    assert!(h.supervisor.is_halted());

    let sent_at_lock = h.paper().orders_sent();
    assert!(h.supervisor.gateway().positions().await.is_empty());

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(h.paper().orders_sent(), sent_at_lock);
    assert!(h.supervisor.gateway().positions().await.is_empty());
    assert!(!h.supervisor.scanner().is_running());
    assert!(!h.supervisor.is_running());
    assert_eq!(h.store.is_active(USER), Some(false));

    assert!(h.supervisor.stop().await);
    assert!(!h.store.last_status().unwrap().is_running);

    // Restarting opens a fresh session that may trade again
    h.paper().set_balance(Decimal::new(1000, 0));
    h.supervisor.start().await.unwrap();
    assert!(!h.supervisor.is_halted());
    assert!(wait_until(Duration::from_secs(2), || h.paper().orders_sent() > sent_at_lock).await);
    assert!(h.supervisor.stop().await);
}

#[tokio::test]
async fn test_stop_is_bounded_and_idempotent() {
    let h = Harness::new(fast_config());
    h.supervisor.start().await.unwrap();
    assert!(h.supervisor.is_running());

    let started = Instant::now();
    assert!(h.supervisor.stop().await);
    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(!h.supervisor.is_running());

    assert!(h.supervisor.stop().await);

    // Restartable
    h.supervisor.start().await.unwrap();
    assert!(h.supervisor.is_running());
    assert!(h.supervisor.stop().await);
}

#[tokio::test]
async fn test_paper_feed_session() {
    let paper = PaperGateway::new(Decimal::new(1000, 0));
    let mut feed = RandomWalkFeed::with_seed(2024);
    feed.install(&paper, Utc::now());
    let gateway = Arc::new(SerializedGateway::new(paper));

    let store = Arc::new(MemoryStore::new());
    let mut config = fast_config();
    config.strategy.symbols = feed.symbols();
    store.seed_config(USER, config.clone());
    let shared: Arc<dyn ConfigStore> = store.clone();
    let supervisor = Supervisor::new(gateway.clone(), shared, SupervisorOptions::new(USER, config));

    supervisor.start().await.unwrap();
    let token = tokio_util::sync::CancellationToken::new();
    let feed_task = tokio::spawn(feed.run(gateway.clone(), token.clone(), Duration::from_millis(5)));

    tokio::time::sleep(Duration::from_millis(300)).await;
    let status = supervisor.status().await;
    assert!(status.gateway_connected);
    assert_eq!(status.profit_targets.len(), 4);
    assert!(!store.snapshots().is_empty());

    assert!(supervisor.stop().await);
    token.cancel();
    feed_task.await.unwrap();
    gateway.disconnect().await;
    assert!(!gateway.is_connected());
}
