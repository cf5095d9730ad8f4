//! Signal scanner: the entry loop.
//!
//! Every `check_interval` the scanner walks the configured symbols in order,
//! builds an indicator frame from recent candles and opens a market order on
//! a mean-reversion signal that passes the volatility filter. In closed-candle
//! mode at most one order is opened per symbol per candle.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use velocity_core::config::{BotConfig, ConfigCache};
use velocity_core::error::GatewayError;
use velocity_core::gateway::TradingGateway;
use velocity_core::store::ConfigStore;
use velocity_core::types::{OrderRequest, OrderSide};
use velocity_core::worker::{sleep_or_cancel, Worker, DEFAULT_STOP_TIMEOUT};

use crate::executor::{ExecutionMetrics, OrderExecutor};
use crate::indicators::{IndicatorFrame, IndicatorPoint};
use crate::lot_sizing::calculate_lot;
use crate::volatility::{self, RejectReason, VolatilityVerdict};

/// Candles fetched per scan.
pub const CANDLE_WINDOW: usize = 100;
/// Fewer candles than this and the symbol is skipped.
pub const MIN_CANDLES: usize = 20;
/// Comment attached to scanner orders.
pub const ORDER_COMMENT: &str = "Velocity Scalp";

const RSI_OVERSOLD: f64 = 40.0;
const RSI_OVERBOUGHT: f64 = 60.0;
const SELECT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Result of scanning one symbol.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    /// No quote, even after selecting the symbol.
    NoTick,
    InsufficientData { candles: usize },
    /// This closed candle already produced an order.
    AlreadyTraded { candle_time: DateTime<Utc> },
    Filtered(RejectReason),
    NoSignal,
    Traded {
        side: OrderSide,
        ticket: u64,
        volume: Decimal,
        candle_time: DateTime<Utc>,
    },
    OrderFailed { side: OrderSide, error: GatewayError },
    /// The cycle was cancelled before the symbol finished.
    Cancelled,
}

/// Result of one scan cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Disabled,
    /// Open positions already at the configured maximum.
    MaxPositions { open: usize },
    Scanned(Vec<(String, ScanOutcome)>),
}

/// Mean-reversion entry rule on one candle.
pub fn entry_signal(point: &IndicatorPoint) -> Option<OrderSide> {
    let close = point.candle.close;
    if close < point.sma && point.rsi < RSI_OVERSOLD {
        Some(OrderSide::Buy)
    } else if close > point.sma && point.rsi > RSI_OVERBOUGHT {
        Some(OrderSide::Sell)
    } else {
        None
    }
}

pub struct SignalScanner {
    gateway: Arc<dyn TradingGateway>,
    store: Arc<dyn ConfigStore>,
    executor: OrderExecutor,
    user_id: String,
    fallback: BotConfig,
    last_trade_candles: Mutex<HashMap<String, DateTime<Utc>>>,
    worker: Worker,
}

impl SignalScanner {
    pub fn new(
        gateway: Arc<dyn TradingGateway>,
        store: Arc<dyn ConfigStore>,
        user_id: impl Into<String>,
        fallback: BotConfig,
    ) -> Self {
        Self {
            executor: OrderExecutor::new(gateway.clone()),
            gateway,
            store,
            user_id: user_id.into(),
            fallback,
            last_trade_candles: Mutex::new(HashMap::new()),
            worker: Worker::new("signal-scanner"),
        }
    }

    /// Start the entry loop. No-op if it is already running.
    pub fn start(self: &Arc<Self>) -> bool {
        let scanner = Arc::clone(self);
        self.worker.start(move |token| async move { scanner.run(token).await })
    }

    /// Start the entry loop so that cancelling `halt` also ends it.
    pub fn start_under(self: &Arc<Self>, halt: &CancellationToken) -> bool {
        let scanner = Arc::clone(self);
        self.worker.start_under(halt, move |token| async move { scanner.run(token).await })
    }

    /// Stop the entry loop, waiting up to the default timeout.
    pub async fn stop(&self) -> bool {
        self.worker.stop(DEFAULT_STOP_TIMEOUT).await
    }

    pub async fn stop_within(&self, timeout: Duration) -> bool {
        self.worker.stop(timeout).await
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_running()
    }

    pub fn metrics(&self) -> ExecutionMetrics {
        self.executor.metrics()
    }

    /// Open time of the last closed candle traded on `symbol`.
    pub fn last_traded_candle(&self, symbol: &str) -> Option<DateTime<Utc>> {
        self.last_trades().get(symbol).copied()
    }

    async fn run(&self, token: CancellationToken) {
        let mut cache = ConfigCache::new(self.user_id.clone(), self.fallback.clone());
        info!(user_id = %self.user_id, "Signal scanner started");

        while !token.is_cancelled() {
            let config = cache.refresh(self.store.as_ref()).await;

            if let Err(e) = self.scan_cycle(&config, &token).await {
                error!(error = %e, "Scan cycle failed");
            }

            if !sleep_or_cancel(&token, config.strategy.check_interval()).await {
                break;
            }
        }

        info!("Signal scanner stopped");
    }

    /// Run one cycle over every configured symbol, in order.
    ///
    /// A failing symbol never aborts the rest of the cycle. Cancellation is
    /// honoured between symbols.
    pub async fn scan_cycle(&self, config: &BotConfig, token: &CancellationToken) -> Result<CycleOutcome> {
        if !config.strategy.enabled {
            debug!("Strategy disabled, skipping scan");
            return Ok(CycleOutcome::Disabled);
        }
        if !self.gateway.is_connected() {
            bail!("gateway not connected");
        }

        let open = self.gateway.positions().await.len();
        if open >= config.risk.max_open_positions {
            debug!(open, max = config.risk.max_open_positions, "Max open positions reached");
            return Ok(CycleOutcome::MaxPositions { open });
        }

        let mut results = Vec::with_capacity(config.strategy.symbols.len());
        for symbol in &config.strategy.symbols {
            if token.is_cancelled() {
                break;
            }
            let outcome = self.scan_symbol(symbol, config, token).await;
            results.push((symbol.clone(), outcome));
        }
        Ok(CycleOutcome::Scanned(results))
    }

    /// Evaluate one symbol and trade on a signal.
    ///
    /// `token` is checked before the select retry wait and again right
    /// before the order goes out.
    pub async fn scan_symbol(&self, symbol: &str, config: &BotConfig, token: &CancellationToken) -> ScanOutcome {
        let strategy = &config.strategy;

        let tick = match self.gateway.tick(symbol).await {
            Some(tick) => tick,
            None => {
                if !self.gateway.select_symbol(symbol).await {
                    debug!(symbol = %symbol, "No tick and symbol select failed");
                    return ScanOutcome::NoTick;
                }
                if !sleep_or_cancel(token, SELECT_RETRY_DELAY).await {
                    return ScanOutcome::Cancelled;
                }
                match self.gateway.tick(symbol).await {
                    Some(tick) => tick,
                    None => {
                        debug!(symbol = %symbol, "No tick after select");
                        return ScanOutcome::NoTick;
                    }
                }
            }
        };

        let candles = self
            .gateway
            .candles(symbol, strategy.timeframe, CANDLE_WINDOW)
            .await
            .unwrap_or_default();
        if candles.len() < MIN_CANDLES {
            debug!(symbol = %symbol, candles = candles.len(), "Insufficient candle history");
            return ScanOutcome::InsufficientData {
                candles: candles.len(),
            };
        }

        let frame = IndicatorFrame::compute(candles);
        let target = if strategy.live_candle_signals {
            frame.last()
        } else {
            frame.last_closed()
        };
        let Some(point) = target else {
            return ScanOutcome::InsufficientData { candles: frame.len() };
        };
        let candle_time = point.candle.time;

        if !strategy.live_candle_signals && self.last_traded_candle(symbol) == Some(candle_time) {
            return ScanOutcome::AlreadyTraded { candle_time };
        }

        let symbol_info = self.gateway.symbol_info(symbol).await;
        match volatility::check(
            &frame,
            &tick,
            symbol_info.as_ref(),
            &config.volatility,
            config.risk.small_profit_usd,
        ) {
            VolatilityVerdict::Rejected(reason) => {
                debug!(symbol = %symbol, reason = %reason, "Volatility filter rejected entry");
                return ScanOutcome::Filtered(reason);
            }
            VolatilityVerdict::Allowed { extreme: true } => {
                info!(symbol = %symbol, atr = point.atr, "Extreme volatility");
            }
            VolatilityVerdict::Allowed { extreme: false } => {}
        }

        debug!(
            symbol = %symbol,
            close = point.candle.close,
            sma = point.sma,
            rsi = point.rsi,
            "Scan"
        );

        let Some(side) = entry_signal(&point) else {
            return ScanOutcome::NoSignal;
        };

        let equity = self.gateway.account_info().await.map(|a| a.equity);
        let volume = calculate_lot(equity, &config.risk, symbol_info.as_ref());
        if token.is_cancelled() {
            debug!(symbol = %symbol, side = %side, "Cancelled before order send");
            return ScanOutcome::Cancelled;
        }
        info!(symbol = %symbol, side = %side, volume = %volume, "Entry signal");

        let request = OrderRequest::market(symbol, side, volume).with_comment(ORDER_COMMENT);
        match self.executor.execute_market_order(&request).await {
            Ok(fill) => {
                info!(symbol = %symbol, ticket = fill.ticket, price = fill.price, "Trade executed");
                if !strategy.live_candle_signals {
                    self.last_trades().insert(symbol.to_string(), candle_time);
                }
                ScanOutcome::Traded {
                    side,
                    ticket: fill.ticket,
                    volume: fill.volume,
                    candle_time,
                }
            }
            Err(error) => {
                warn!(symbol = %symbol, side = %side, error = %error, "Trade failed");
                ScanOutcome::OrderFailed { side, error }
            }
        }
    }

    fn last_trades(&self) -> MutexGuard<'_, HashMap<String, DateTime<Utc>>> {
        self.last_trade_candles.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use mockall::mock;
    use velocity_core::config::VolatilityConfig;
    use velocity_core::gateway::PaperGateway;
    use velocity_core::store::MemoryStore;
    use velocity_core::types::{
        AccountSnapshot, Candle, CloseAllSummary, ClosedPosition, OrderFill, Position, SymbolInfo,
        Tick, Timeframe,
    };

    mock! {
        pub Gateway {}

        #[async_trait]
        impl TradingGateway for Gateway {
            async fn connect(&self) -> std::result::Result<(), GatewayError>;
            async fn disconnect(&self);
            fn is_connected(&self) -> bool;
            async fn account_info(&self) -> Option<AccountSnapshot>;
            async fn positions(&self) -> Vec<Position>;
            async fn tick(&self, symbol: &str) -> Option<Tick>;
            async fn candles(&self, symbol: &str, timeframe: Timeframe, count: usize) -> Option<Vec<Candle>>;
            async fn symbol_info(&self, symbol: &str) -> Option<SymbolInfo>;
            async fn select_symbol(&self, symbol: &str) -> bool;
            async fn open_order(&self, request: &OrderRequest) -> std::result::Result<OrderFill, GatewayError>;
            async fn close_order(&self, ticket: u64) -> std::result::Result<ClosedPosition, GatewayError>;
            async fn close_all_orders(&self) -> CloseAllSummary;
        }
    }

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

    fn start_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap()
    }

    /// Minute candles moving `step` per bar from 1.10000.
    fn trending(n: usize, step: f64) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let close = 1.1 + step * i as f64;
                Candle::new(
                    start_time() + ChronoDuration::minutes(i as i64),
                    close - step,
                    close + 0.0002,
                    close - 0.0002,
                    close,
                )
            })
            .collect()
    }

    fn config(live: bool) -> BotConfig {
        let mut config = BotConfig::default();
        config.strategy.symbols = vec![SYMBOL.to_string()];
        config.strategy.live_candle_signals = live;
        config.volatility = VolatilityConfig {
            enabled: false,
            ..Default::default()
        };
        config
    }

    async fn paper(candles: Vec<Candle>) -> Arc<PaperGateway> {
        let gw = Arc::new(PaperGateway::new(Decimal::new(1000, 0)));
        gw.add_symbol(eurusd());
        gw.set_tick(SYMBOL, 1.09990, 1.10000);
        gw.set_candles(SYMBOL, Timeframe::M1, candles);
        gw.connect().await.unwrap();
        gw
    }

    /// A token nobody cancels.
    fn live() -> CancellationToken {
        CancellationToken::new()
    }

    fn scanner(gateway: Arc<dyn TradingGateway>) -> SignalScanner {
        SignalScanner::new(gateway, Arc::new(MemoryStore::new()), "tester", BotConfig::default())
    }

    #[test]
    fn test_entry_signal_rule() {
        let candle = Candle::new(start_time(), 1.0, 1.0, 1.0, 1.0);
        let point = |sma, rsi| IndicatorPoint {
            candle,
            sma,
            rsi,
            true_range: 0.0,
            atr: 0.0,
        };
        assert_eq!(entry_signal(&point(1.1, 35.0)), Some(OrderSide::Buy));
        assert_eq!(entry_signal(&point(0.9, 65.0)), Some(OrderSide::Sell));
        assert_eq!(entry_signal(&point(1.1, 50.0)), None);
        assert_eq!(entry_signal(&point(0.9, 35.0)), None);
        assert_eq!(entry_signal(&point(f64::NAN, f64::NAN)), None);
    }

    #[tokio::test]
    async fn test_one_trade_per_closed_candle() {
        let gw = paper(trending(40, -0.0005)).await;
        let scanner = scanner(gw.clone());
        let config = config(false);

        let first = scanner.scan_symbol(SYMBOL, &config, &live()).await;
        let closed_time = start_time() + ChronoDuration::minutes(38);
        match first {
            ScanOutcome::Traded { side, candle_time, .. } => {
                assert_eq!(side, OrderSide::Buy);
                assert_eq!(candle_time, closed_time);
            }
            other => panic!("expected a trade, got {other:?}"),
        }

        for _ in 0..3 {
            let again = scanner.scan_symbol(SYMBOL, &config, &live()).await;
            assert_eq!(again, ScanOutcome::AlreadyTraded { candle_time: closed_time });
        }
        assert_eq!(gw.orders_sent(), 1);
        assert_eq!(scanner.last_traded_candle(SYMBOL), Some(closed_time));

        // A new bar closes the previous one
        let next = start_time() + ChronoDuration::minutes(40);
        gw.push_candle(SYMBOL, Timeframe::M1, Candle::new(next, 1.08, 1.0802, 1.0798, 1.08));
        assert!(matches!(
            scanner.scan_symbol(SYMBOL, &config, &live()).await,
            ScanOutcome::Traded { .. }
        ));
        assert_eq!(gw.orders_sent(), 2);
    }

    #[tokio::test]
    async fn test_live_candle_mode_does_not_dedupe() {
        let gw = paper(trending(40, 0.0005)).await;
        let scanner = scanner(gw.clone());
        let config = config(true);

        for _ in 0..2 {
            match scanner.scan_symbol(SYMBOL, &config, &live()).await {
                ScanOutcome::Traded { side, candle_time, .. } => {
                    assert_eq!(side, OrderSide::Sell);
                    assert_eq!(candle_time, start_time() + ChronoDuration::minutes(39));
                }
                other => panic!("expected a trade, got {other:?}"),
            }
        }
        assert_eq!(gw.orders_sent(), 2);
        assert!(scanner.last_traded_candle(SYMBOL).is_none());
    }

    #[tokio::test]
    async fn test_order_sized_from_equity_and_tagged() {
        let gw = paper(trending(40, -0.0005)).await;
        gw.set_balance(Decimal::new(5000, 0));
        let scanner = scanner(gw.clone());
        let mut config = config(false);
        config.risk.risk_multiplier = Decimal::new(1, 1);

        assert!(matches!(
            scanner.scan_symbol(SYMBOL, &config, &live()).await,
            ScanOutcome::Traded { .. }
        ));
        let positions = gw.positions().await;
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].volume, Decimal::new(5, 1));
        assert_eq!(positions[0].comment, ORDER_COMMENT);
        assert_eq!(scanner.metrics().orders_filled, 1);
    }

    #[tokio::test]
    async fn test_failed_order_is_not_recorded() {
        let gw = paper(trending(40, -0.0005)).await;
        gw.set_reject_orders(Some("Trade disabled".to_string()));
        let scanner = scanner(gw.clone());
        let config = config(false);

        assert!(matches!(
            scanner.scan_symbol(SYMBOL, &config, &live()).await,
            ScanOutcome::OrderFailed { side: OrderSide::Buy, .. }
        ));
        assert!(scanner.last_traded_candle(SYMBOL).is_none());

        // Next cycle tries again
        gw.set_reject_orders(None);
        assert!(matches!(
            scanner.scan_symbol(SYMBOL, &config, &live()).await,
            ScanOutcome::Traded { .. }
        ));
        assert_eq!(gw.orders_sent(), 2);
    }

    #[tokio::test]
    async fn test_insufficient_history_and_no_signal() {
        let gw = paper(trending(19, -0.0005)).await;
        let scanner = scanner(gw.clone());
        assert_eq!(
            scanner.scan_symbol(SYMBOL, &config(false), &live()).await,
            ScanOutcome::InsufficientData { candles: 19 }
        );

        // Flat market: RSI undefined, no signal
        gw.set_candles(SYMBOL, Timeframe::M1, trending(40, 0.0));
        assert_eq!(scanner.scan_symbol(SYMBOL, &config(false), &live()).await, ScanOutcome::NoSignal);
        assert_eq!(gw.orders_sent(), 0);
    }

    #[tokio::test]
    async fn test_volatility_filter_blocks_quiet_market() {
        // Ranges of 0.00002 leave ATR under the 0.0001 floor
        let quiet = (0..40)
            .map(|i| {
                let close = 1.1 - 0.00001 * i as f64;
                Candle::new(
                    start_time() + ChronoDuration::minutes(i as i64),
                    close,
                    close + 0.00001,
                    close - 0.00001,
                    close,
                )
            })
            .collect();
        let gw = paper(quiet).await;
        let scanner = scanner(gw.clone());
        let mut config = config(false);
        config.volatility.enabled = true;

        assert!(matches!(
            scanner.scan_symbol(SYMBOL, &config, &live()).await,
            ScanOutcome::Filtered(RejectReason::LowAtr { .. })
        ));
        assert_eq!(gw.orders_sent(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hidden_symbol_selected_and_retried() {
        let gw = Arc::new(PaperGateway::new(Decimal::new(1000, 0)));
        gw.add_hidden_symbol(eurusd());
        gw.set_tick(SYMBOL, 1.09990, 1.10000);
        gw.set_candles(SYMBOL, Timeframe::M1, trending(40, -0.0005));
        gw.connect().await.unwrap();

        let scanner = scanner(gw.clone());
        assert!(matches!(
            scanner.scan_symbol(SYMBOL, &config(false), &live()).await,
            ScanOutcome::Traded { .. }
        ));
    }

    #[tokio::test]
    async fn test_cancelled_scan_skips_select_wait() {
        let gw = Arc::new(PaperGateway::new(Decimal::new(1000, 0)));
        gw.add_hidden_symbol(eurusd());
        gw.set_tick(SYMBOL, 1.09990, 1.10000);
        gw.set_candles(SYMBOL, Timeframe::M1, trending(40, -0.0005));
        gw.connect().await.unwrap();

        let scanner = scanner(gw.clone());
        let token = CancellationToken::new();
        token.cancel();
        let outcome = tokio::time::timeout(
            Duration::from_millis(50),
            scanner.scan_symbol(SYMBOL, &config(false), &token),
        )
        .await
        .unwrap();
        assert_eq!(outcome, ScanOutcome::Cancelled);
        assert_eq!(gw.orders_sent(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_scan_sends_no_order() {
        let gw = paper(trending(40, -0.0005)).await;
        let scanner = scanner(gw.clone());
        let token = CancellationToken::new();
        token.cancel();

        assert_eq!(
            scanner.scan_symbol(SYMBOL, &config(false), &token).await,
            ScanOutcome::Cancelled
        );
        assert_eq!(gw.orders_sent(), 0);
        assert!(scanner.last_traded_candle(SYMBOL).is_none());
    }

    #[tokio::test]
    async fn test_missing_tick_selects_once_then_skips() {
        let mut gw = MockGateway::new();
        gw.expect_tick().times(1).returning(|_| None);
        gw.expect_select_symbol().times(1).returning(|_| false);
        gw.expect_candles().times(0);
        gw.expect_open_order().times(0);

        let scanner = scanner(Arc::new(gw));
        assert_eq!(scanner.scan_symbol(SYMBOL, &config(false), &live()).await, ScanOutcome::NoTick);
    }

    #[tokio::test]
    async fn test_candle_fetch_failure_is_insufficient_data() {
        let mut gw = MockGateway::new();
        gw.expect_tick().returning(|_| {
            Some(Tick {
                bid: 1.1,
                ask: 1.1001,
                time: Utc::now(),
            })
        });
        gw.expect_candles().times(1).returning(|_, _, count| {
            assert_eq!(count, CANDLE_WINDOW);
            None
        });
        gw.expect_open_order().times(0);

        let scanner = scanner(Arc::new(gw));
        assert_eq!(
            scanner.scan_symbol(SYMBOL, &config(false), &live()).await,
            ScanOutcome::InsufficientData { candles: 0 }
        );
    }

    #[tokio::test]
    async fn test_cycle_continues_past_failing_symbol() {
        let gw = paper(trending(40, -0.0005)).await;
        let scanner = scanner(gw.clone());
        let mut config = config(false);
        config.strategy.symbols = vec!["XAUUSD".to_string(), SYMBOL.to_string()];

        let outcome = scanner
            .scan_cycle(&config, &CancellationToken::new())
            .await
            .unwrap();
        let CycleOutcome::Scanned(results) = outcome else {
            panic!("expected a scanned cycle");
        };
        assert_eq!(results.len(), 2);
        assert_eq!(results[0], ("XAUUSD".to_string(), ScanOutcome::NoTick));
        assert!(matches!(results[1].1, ScanOutcome::Traded { .. }));
    }

    #[tokio::test]
    async fn test_cycle_skips_when_disabled_or_full() {
        let gw = paper(trending(40, -0.0005)).await;
        let scanner = scanner(gw.clone());
        let token = CancellationToken::new();

        let mut disabled = config(false);
        disabled.strategy.enabled = false;
        assert_eq!(scanner.scan_cycle(&disabled, &token).await.unwrap(), CycleOutcome::Disabled);

        let mut full = config(false);
        full.risk.max_open_positions = 1;
        assert!(matches!(
            scanner.scan_cycle(&full, &token).await.unwrap(),
            CycleOutcome::Scanned(_)
        ));
        assert_eq!(
            scanner.scan_cycle(&full, &token).await.unwrap(),
            CycleOutcome::MaxPositions { open: 1 }
        );
        assert_eq!(gw.orders_sent(), 1);
    }

    #[tokio::test]
    async fn test_cycle_fails_when_disconnected() {
        let gw = Arc::new(PaperGateway::new(Decimal::new(1000, 0)));
        let scanner = scanner(gw);
        assert!(scanner
            .scan_cycle(&config(false), &CancellationToken::new())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_loop_start_stop() {
        let gw = paper(trending(40, -0.0005)).await;
        let store = Arc::new(MemoryStore::new());
        let mut cfg = config(false);
        cfg.strategy.check_interval_secs = 0.01;
        store.seed_config("tester", cfg);

        let scanner = Arc::new(SignalScanner::new(gw.clone(), store, "tester", BotConfig::default()));
        assert!(scanner.start());
        assert!(!scanner.start());
        assert!(scanner.is_running());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(scanner.stop().await);
        assert!(!scanner.is_running());

        // Many cycles ran, one order for the single closed candle
        assert_eq!(gw.orders_sent(), 1);
    }

    #[tokio::test]
    async fn test_loop_ends_when_halt_cancelled() {
        let gw = paper(trending(40, 0.0005)).await;
        let store = Arc::new(MemoryStore::new());
        let mut cfg = config(true);
        cfg.strategy.check_interval_secs = 0.01;
        store.seed_config("tester", cfg);

        let scanner = Arc::new(SignalScanner::new(gw.clone(), store, "tester", BotConfig::default()));
        let halt = CancellationToken::new();
        assert!(scanner.start_under(&halt));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(gw.orders_sent() > 0);

        halt.cancel();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!scanner.is_running());
        let sent = gw.orders_sent();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(gw.orders_sent(), sent);
    }
}
