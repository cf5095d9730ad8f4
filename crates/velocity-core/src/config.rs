//! Configuration management for the Velocity trading bot.
//!
//! Process-level settings come from the environment (`AppConfig::from_env`).
//! Strategy and risk parameters live in the configuration store and are
//! re-read by every loop iteration as a `BotConfig` snapshot.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

use crate::store::ConfigStore;
use crate::types::Timeframe;

/// Default store user for the single-account deployment.
pub const DEFAULT_USER_ID: &str = "velocity_bot";

/// Entry strategy parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Master switch for the signal scanner.
    pub enabled: bool,
    /// Symbols scanned in order, once per cycle.
    pub symbols: Vec<String>,
    pub timeframe: Timeframe,
    /// Seconds between scanner cycles.
    pub check_interval_secs: f64,
    /// Evaluate the forming candle instead of the last closed one.
    pub live_candle_signals: bool,
    /// Seconds between risk monitor iterations.
    pub profit_check_interval_secs: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            symbols: parse_symbols("EURUSD,USDJPY,GBPUSD,Volatility 75 Index"),
            timeframe: Timeframe::M1,
            check_interval_secs: 0.5,
            live_candle_signals: false,
            profit_check_interval_secs: 1.0,
        }
    }
}

impl StrategyConfig {
    pub fn check_interval(&self) -> Duration {
        secs_to_duration(self.check_interval_secs)
    }

    pub fn profit_check_interval(&self) -> Duration {
        secs_to_duration(self.profit_check_interval_secs)
    }
}

/// Risk parameters shared by the risk and account monitors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Aggregate floating profit (USD) that closes every position.
    pub small_profit_usd: Decimal,
    /// Aggregate floating loss, as % of equity, that closes every position.
    pub max_loss_percent: Decimal,
    pub max_open_positions: usize,
    /// Lots per $1000 of equity.
    pub risk_multiplier: Decimal,
    pub auto_lot_enabled: bool,
    /// Floating loss, as % of the day-start balance, that locks the account.
    pub daily_loss_limit_pct: Decimal,
    /// Daily P&L, as % of the day-start balance, that locks in profit.
    pub daily_profit_target_pct: Decimal,
    pub atr_multiplier: f64,
    pub trailing_stop_pips: u32,
    pub monitor_interval_ms: u64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            small_profit_usd: Decimal::new(2, 0),
            max_loss_percent: Decimal::new(10, 0),
            max_open_positions: 10,
            risk_multiplier: Decimal::new(1, 2),
            auto_lot_enabled: true,
            daily_loss_limit_pct: Decimal::ONE,
            daily_profit_target_pct: Decimal::new(2, 0),
            atr_multiplier: 2.0,
            trailing_stop_pips: 10,
            monitor_interval_ms: 200,
        }
    }
}

impl RiskConfig {
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms.max(1))
    }
}

/// Volatility filter parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolatilityConfig {
    pub enabled: bool,
    /// ATR below this means the market is asleep.
    pub min_atr_threshold: f64,
    /// Trailing window for the relative-volatility average.
    pub avg_period: usize,
    /// Multiple of `min_atr_threshold` flagged as extreme volatility.
    pub extreme_vol_threshold: f64,
}

impl Default for VolatilityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_atr_threshold: 0.0001,
            avg_period: 20,
            extreme_vol_threshold: 2.5,
        }
    }
}

/// Full strategy/risk snapshot read by a loop iteration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BotConfig {
    pub strategy: StrategyConfig,
    pub risk: RiskConfig,
    pub volatility: VolatilityConfig,
}

/// Partial update to a `BotConfig`. Only fields that are present change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfigUpdate {
    pub strategy_enabled: Option<bool>,
    pub strategy_symbols: Option<Vec<String>>,
    pub strategy_timeframe: Option<Timeframe>,
    pub strategy_check_interval: Option<f64>,
    pub live_candle_signals: Option<bool>,
    pub profit_check_interval: Option<f64>,
    pub small_profit_usd: Option<Decimal>,
    pub max_loss_percent: Option<Decimal>,
    pub max_open_positions: Option<usize>,
    pub risk_multiplier: Option<Decimal>,
    pub auto_lot_enabled: Option<bool>,
    pub daily_loss_limit_pct: Option<Decimal>,
    pub daily_profit_target_pct: Option<Decimal>,
    pub atr_multiplier: Option<f64>,
    pub trailing_stop_pips: Option<u32>,
    pub monitor_interval_ms: Option<u64>,
    pub volatility_filter_enabled: Option<bool>,
    pub min_atr_threshold: Option<f64>,
    pub volatility_avg_period: Option<usize>,
    pub extreme_vol_threshold: Option<f64>,
}

impl BotConfig {
    /// Merge an update into this config, leaving absent fields untouched.
    pub fn apply(&mut self, update: &BotConfigUpdate) {
        fn set<T: Clone>(target: &mut T, value: &Option<T>) {
            if let Some(v) = value {
                *target = v.clone();
            }
        }

        let s = &mut self.strategy;
        set(&mut s.enabled, &update.strategy_enabled);
        set(&mut s.symbols, &update.strategy_symbols);
        set(&mut s.timeframe, &update.strategy_timeframe);
        set(&mut s.check_interval_secs, &update.strategy_check_interval);
        set(&mut s.live_candle_signals, &update.live_candle_signals);
        set(&mut s.profit_check_interval_secs, &update.profit_check_interval);

        let r = &mut self.risk;
        set(&mut r.small_profit_usd, &update.small_profit_usd);
        set(&mut r.max_loss_percent, &update.max_loss_percent);
        set(&mut r.max_open_positions, &update.max_open_positions);
        set(&mut r.risk_multiplier, &update.risk_multiplier);
        set(&mut r.auto_lot_enabled, &update.auto_lot_enabled);
        set(&mut r.daily_loss_limit_pct, &update.daily_loss_limit_pct);
        set(&mut r.daily_profit_target_pct, &update.daily_profit_target_pct);
        set(&mut r.atr_multiplier, &update.atr_multiplier);
        set(&mut r.trailing_stop_pips, &update.trailing_stop_pips);
        set(&mut r.monitor_interval_ms, &update.monitor_interval_ms);

        let v = &mut self.volatility;
        set(&mut v.enabled, &update.volatility_filter_enabled);
        set(&mut v.min_atr_threshold, &update.min_atr_threshold);
        set(&mut v.avg_period, &update.volatility_avg_period);
        set(&mut v.extreme_vol_threshold, &update.extreme_vol_threshold);
    }
}

/// Process-level configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Store user the engines report under.
    pub user_id: String,
    /// Initial strategy/risk parameters seeded into the store.
    pub bot: BotConfig,
    pub account_monitor_enabled: bool,
    /// Starting balance for the paper gateway.
    pub paper_balance: Decimal,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let defaults = BotConfig::default();
        let strategy = StrategyConfig {
            enabled: env_or("STRATEGY_ENABLED", defaults.strategy.enabled),
            symbols: env::var("STRATEGY_SYMBOLS")
                .map(|s| parse_symbols(&s))
                .unwrap_or(defaults.strategy.symbols),
            timeframe: env::var("STRATEGY_TIMEFRAME")
                .map(|s| Timeframe::parse_or_default(&s))
                .unwrap_or(defaults.strategy.timeframe),
            check_interval_secs: env_or(
                "STRATEGY_CHECK_INTERVAL",
                defaults.strategy.check_interval_secs,
            ),
            live_candle_signals: env_or(
                "LIVE_CANDLE_SIGNALS",
                defaults.strategy.live_candle_signals,
            ),
            profit_check_interval_secs: env_or(
                "PROFIT_CHECK_INTERVAL",
                defaults.strategy.profit_check_interval_secs,
            ),
        };
        let risk = RiskConfig {
            small_profit_usd: env_or("SMALL_PROFIT_USD", defaults.risk.small_profit_usd),
            max_loss_percent: env_or("MAX_LOSS_PERCENT", defaults.risk.max_loss_percent),
            max_open_positions: env_or("MAX_OPEN_POSITIONS", defaults.risk.max_open_positions),
            risk_multiplier: env_or("RISK_MULTIPLIER", defaults.risk.risk_multiplier),
            auto_lot_enabled: env_or("AUTO_LOT_ENABLED", defaults.risk.auto_lot_enabled),
            daily_loss_limit_pct: env_or(
                "DAILY_LOSS_LIMIT_PCT",
                defaults.risk.daily_loss_limit_pct,
            ),
            daily_profit_target_pct: env_or(
                "DAILY_PROFIT_TARGET_PCT",
                defaults.risk.daily_profit_target_pct,
            ),
            atr_multiplier: env_or("ATR_MULTIPLIER", defaults.risk.atr_multiplier),
            trailing_stop_pips: env_or("TRAILING_STOP_PIPS", defaults.risk.trailing_stop_pips),
            monitor_interval_ms: env_or("MONITOR_INTERVAL_MS", defaults.risk.monitor_interval_ms),
        };
        let volatility = VolatilityConfig {
            enabled: env_or("VOLATILITY_FILTER_ENABLED", defaults.volatility.enabled),
            min_atr_threshold: env_or("MIN_ATR_THRESHOLD", defaults.volatility.min_atr_threshold),
            avg_period: env_or("VOLATILITY_AVG_PERIOD", defaults.volatility.avg_period),
            extreme_vol_threshold: env_or(
                "EXTREME_VOL_THRESHOLD",
                defaults.volatility.extreme_vol_threshold,
            ),
        };

        Self {
            user_id: env::var("VELOCITY_USER_ID").unwrap_or_else(|_| DEFAULT_USER_ID.to_string()),
            bot: BotConfig {
                strategy,
                risk,
                volatility,
            },
            account_monitor_enabled: env_or("ACCOUNT_MONITOR_ENABLED", true),
            paper_balance: env_or("PAPER_BALANCE", Decimal::new(1000, 0)),
        }
    }
}

/// Loop-local last-known configuration.
///
/// Each iteration calls `refresh`; when the store is unreachable the previous
/// snapshot (or the hard-coded defaults on first use) is returned instead.
#[derive(Debug, Clone)]
pub struct ConfigCache {
    user_id: String,
    last_known: BotConfig,
    stale: bool,
}

impl ConfigCache {
    pub fn new(user_id: impl Into<String>, fallback: BotConfig) -> Self {
        Self {
            user_id: user_id.into(),
            last_known: fallback,
            stale: false,
        }
    }

    /// Whether the last refresh fell back to the cached value.
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub async fn refresh(&mut self, store: &dyn ConfigStore) -> BotConfig {
        match store.fetch_config(&self.user_id).await {
            Some(config) => {
                if self.stale {
                    info!(user_id = %self.user_id, "Config store reachable again");
                }
                self.stale = false;
                self.last_known = config;
            }
            None => {
                if !self.stale {
                    warn!(
                        user_id = %self.user_id,
                        "Config store unreachable, using last-known configuration"
                    );
                }
                self.stale = true;
            }
        }
        self.last_known.clone()
    }
}

/// Split a comma-separated symbol list, dropping blanks.
pub fn parse_symbols(s: &str) -> Vec<String> {
    s.split(',')
        .map(|sym| sym.trim())
        .filter(|sym| !sym.is_empty())
        .map(String::from)
        .collect()
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn secs_to_duration(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::from_secs_f64(secs)
    } else {
        Duration::from_millis(100)
    }
}
