//! Adaptive profit target based on hourly volatility.
//!
//! In normal conditions the target is a fixed share of the balance. When the
//! current H1 ATR expands past `atr_multiplier` times its trailing daily mean
//! the fixed cap is dropped in favour of a trailing stop. The result is
//! advisory and never written back into the shared configuration.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use trading_engine::indicators::{atr, trailing_mean, true_range, ATR_PERIOD};
use velocity_core::config::RiskConfig;
use velocity_core::gateway::TradingGateway;
use velocity_core::types::Timeframe;

/// H1 candles fetched for the calculation.
pub const SCALING_WINDOW: usize = 100;
/// Hours in the trailing ATR mean.
pub const DAILY_HOURS: usize = 24;
const MIN_CANDLES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ProfitTarget {
    /// Close at a fixed USD amount, if one could be computed.
    Fixed { target_usd: Option<Decimal> },
    /// Let winners run behind a trailing stop.
    Trailing { trailing_stop_pips: u32 },
}

/// Whether the latest ATR has expanded to `multiplier` times its trailing mean.
pub fn is_expanded(atr_series: &[f64], multiplier: f64) -> bool {
    let Some(current) = atr_series.last().copied() else {
        return false;
    };
    let mean = trailing_mean(atr_series, DAILY_HOURS);
    current >= multiplier * mean
}

pub struct AdaptiveScaling {
    gateway: Arc<dyn TradingGateway>,
}

impl AdaptiveScaling {
    pub fn new(gateway: Arc<dyn TradingGateway>) -> Self {
        Self { gateway }
    }

    pub async fn dynamic_target(&self, symbol: &str, risk: &RiskConfig) -> ProfitTarget {
        let Some(account) = self.gateway.account_info().await else {
            return ProfitTarget::Fixed { target_usd: None };
        };
        let base_target = account.balance * risk.daily_profit_target_pct / Decimal::ONE_HUNDRED;
        let fixed = ProfitTarget::Fixed {
            target_usd: Some(base_target),
        };

        let candles = match self.gateway.candles(symbol, Timeframe::H1, SCALING_WINDOW).await {
            Some(candles) if candles.len() >= MIN_CANDLES => candles,
            _ => return fixed,
        };

        let atr_series = atr(&true_range(&candles), ATR_PERIOD);
        if is_expanded(&atr_series, risk.atr_multiplier) {
            debug!(symbol = %symbol, "Volatility expansion, switching to trailing target");
            ProfitTarget::Trailing {
                trailing_stop_pips: risk.trailing_stop_pips,
            }
        } else {
            fixed
        }
    }
}
