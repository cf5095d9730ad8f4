//! Random-walk market data for the paper terminal.
//!
//! Registers a fixed set of symbols, seeds their candle history on every
//! timeframe and then moves each price by a bounded random step per tick,
//! rolling the forming bar of every timeframe as it goes.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use velocity_core::gateway::{PaperGateway, SerializedGateway};
use velocity_core::types::{Candle, SymbolInfo, Timeframe};
use velocity_core::worker::sleep_or_cancel;

/// Bars seeded per timeframe at install.
pub const HISTORY_BARS: usize = 120;
/// Bars kept per series before the oldest are dropped.
pub const MAX_BARS: usize = 500;

const TIMEFRAMES: [Timeframe; 5] = [
    Timeframe::M1,
    Timeframe::M5,
    Timeframe::M15,
    Timeframe::M30,
    Timeframe::H1,
];

/// Nominal seconds per step, used to scale the seeded bar ranges.
const NOMINAL_STEP_SECS: f64 = 0.25;

struct WalkSymbol {
    info: SymbolInfo,
    price: f64,
    half_spread: f64,
    /// Relative standard step per tick.
    step: f64,
}

pub struct RandomWalkFeed {
    rng: StdRng,
    symbols: Vec<WalkSymbol>,
    series: HashMap<(String, Timeframe), Vec<Candle>>,
}

fn symbol(name: &str, point: f64, tick_value: f64, volume_min: Decimal, volume_step: Decimal) -> SymbolInfo {
    SymbolInfo {
        name: name.to_string(),
        point,
        tick_value,
        volume_min,
        volume_max: Decimal::new(100, 0),
        volume_step,
    }
}

fn default_symbols() -> Vec<WalkSymbol> {
    let lot = Decimal::new(1, 2);
    vec![
        WalkSymbol {
            info: symbol("EURUSD", 0.00001, 1.0, lot, lot),
            price: 1.0850,
            half_spread: 0.00001,
            step: 0.00005,
        },
        WalkSymbol {
            info: symbol("USDJPY", 0.001, 0.67, lot, lot),
            price: 150.20,
            half_spread: 0.001,
            step: 0.00005,
        },
        WalkSymbol {
            info: symbol("GBPUSD", 0.00001, 1.0, lot, lot),
            price: 1.2650,
            half_spread: 0.00001,
            step: 0.00006,
        },
        WalkSymbol {
            info: symbol("Volatility 75 Index", 0.01, 0.01, Decimal::new(1, 3), Decimal::new(1, 3)),
            price: 400_000.0,
            half_spread: 20.0,
            step: 0.0002,
        },
    ]
}

/// Open time of the bar containing `now`.
fn bucket_start(now: DateTime<Utc>, timeframe: Timeframe) -> DateTime<Utc> {
    let secs = timeframe.seconds();
    let ts = now.timestamp();
    DateTime::from_timestamp(ts - ts.rem_euclid(secs), 0).unwrap_or(now)
}

impl RandomWalkFeed {
    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }

    /// Deterministic feed for tests.
    pub fn with_seed(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }

    fn new(rng: StdRng) -> Self {
        Self {
            rng,
            symbols: default_symbols(),
            series: HashMap::new(),
        }
    }

    pub fn symbols(&self) -> Vec<String> {
        self.symbols.iter().map(|s| s.info.name.clone()).collect()
    }

    pub fn price(&self, symbol: &str) -> Option<f64> {
        self.symbols.iter().find(|s| s.info.name == symbol).map(|s| s.price)
    }

    /// Register every symbol with the terminal and seed its history so the
    /// indicators have data from the first scan.
    pub fn install(&mut self, gateway: &PaperGateway, now: DateTime<Utc>) {
        for index in 0..self.symbols.len() {
            gateway.add_symbol(self.symbols[index].info.clone());

            for timeframe in TIMEFRAMES {
                let bars = self.seed_history(index, timeframe, now);
                let name = self.symbols[index].info.name.clone();
                gateway.set_candles(&name, timeframe, bars.clone());
                self.series.insert((name, timeframe), bars);
            }

            let sym = &self.symbols[index];
            gateway.set_tick(&sym.info.name, sym.price - sym.half_spread, sym.price + sym.half_spread);
        }
        info!(symbols = self.symbols.len(), bars = HISTORY_BARS, "Paper feed installed");
    }

    fn seed_history(&mut self, index: usize, timeframe: Timeframe, now: DateTime<Utc>) -> Vec<Candle> {
        let current = bucket_start(now, timeframe);
        let span = ChronoDuration::seconds(timeframe.seconds());
        let steps_per_bar = timeframe.seconds() as f64 / NOMINAL_STEP_SECS;
        let bar_step = self.symbols[index].step * steps_per_bar.sqrt();

        // Walk backwards from the live price so the last bar closes on it.
        let mut close = self.symbols[index].price;
        let mut bars = Vec::with_capacity(HISTORY_BARS);
        for i in 0..HISTORY_BARS {
            let open = close * (1.0 - self.rng.gen_range(-1.0_f64..1.0) * bar_step);
            let wick_high = self.rng.gen::<f64>() * bar_step * 0.5 * close;
            let wick_low = self.rng.gen::<f64>() * bar_step * 0.5 * close;
            let time = current - span * i as i32;
            bars.push(Candle::new(
                time,
                open,
                open.max(close) + wick_high,
                open.min(close) - wick_low,
                close,
            ));
            close = open;
        }
        bars.reverse();
        bars
    }

    /// Advance every symbol by one random step at `now`.
    pub fn step(&mut self, gateway: &PaperGateway, now: DateTime<Utc>) {
        for index in 0..self.symbols.len() {
            let shock = self.rng.gen_range(-1.0_f64..1.0);
            let sym = &mut self.symbols[index];
            sym.price *= 1.0 + shock * sym.step;
            let price = sym.price;
            let name = sym.info.name.clone();
            gateway.set_tick(&name, price - sym.half_spread, price + sym.half_spread);

            for timeframe in TIMEFRAMES {
                self.roll_bar(gateway, &name, timeframe, price, now);
            }
        }
    }

    fn roll_bar(&mut self, gateway: &PaperGateway, name: &str, timeframe: Timeframe, price: f64, now: DateTime<Utc>) {
        let bucket = bucket_start(now, timeframe);
        let series = self.series.entry((name.to_string(), timeframe)).or_default();

        match series.last_mut() {
            Some(bar) if bar.time == bucket => {
                bar.high = bar.high.max(price);
                bar.low = bar.low.min(price);
                bar.close = price;
            }
            Some(bar) if bar.time > bucket => return,
            last => {
                let open = last.map(|b| b.close).unwrap_or(price);
                series.push(Candle::new(bucket, open, open.max(price), open.min(price), price));
            }
        }

        if series.len() > MAX_BARS {
            let excess = series.len() - MAX_BARS;
            series.drain(..excess);
            gateway.set_candles(name, timeframe, series.clone());
        } else if let Some(bar) = series.last() {
            gateway.push_candle(name, timeframe, *bar);
        }
    }

    /// Drive the terminal until `token` is cancelled.
    pub async fn run(mut self, gateway: Arc<SerializedGateway<PaperGateway>>, token: CancellationToken, interval: Duration) {
        info!(interval_ms = interval.as_millis() as u64, "Paper feed running");
        loop {
            self.step(gateway.inner(), Utc::now());
            if !sleep_or_cancel(&token, interval).await {
                break;
            }
        }
        debug!("Paper feed stopped");
    }
}
