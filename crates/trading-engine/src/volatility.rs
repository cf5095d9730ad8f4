//! Volatility filter gating scanner entries.
//!
//! Checks run in order and stop at the first rejection: filter switch, ATR
//! floor, volatility expansion, then spread cost against the profit target.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::fmt;
use velocity_core::config::VolatilityConfig;
use velocity_core::types::{SymbolInfo, Tick};

use crate::indicators::IndicatorFrame;

/// Largest share of the profit target the spread may cost.
pub const MAX_SPREAD_COST_RATIO: f64 = 0.3;
/// Volume used for the spread estimate when the broker reports none.
const FALLBACK_MIN_VOLUME: f64 = 0.01;

#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    /// ATR below the configured floor.
    LowAtr { atr: f64, threshold: f64 },
    /// Current range below the trailing ATR mean.
    Contracting { current: f64, average: f64 },
    /// Spread alone would eat too much of the target.
    SpreadTooExpensive { cost: f64, limit: f64 },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LowAtr { atr, threshold } => {
                write!(f, "Low ATR {:.5} < {:.5} (market sleep)", atr, threshold)
            }
            Self::Contracting { current, average } => {
                write!(f, "Contracting volatility {:.5} < avg {:.5}", current, average)
            }
            Self::SpreadTooExpensive { cost, limit } => {
                write!(f, "Spread too expensive ${:.2} > ${:.2}", cost, limit)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum VolatilityVerdict {
    /// Entry allowed. `extreme` is informational only.
    Allowed { extreme: bool },
    Rejected(RejectReason),
}

impl VolatilityVerdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

/// Evaluate the filter against the latest candle of `frame`.
///
/// `symbol_info` feeds the spread estimate; without it, or with a
/// non-positive point size or tick value, the spread check is skipped.
pub fn check(
    frame: &IndicatorFrame,
    tick: &Tick,
    symbol_info: Option<&SymbolInfo>,
    config: &VolatilityConfig,
    target_usd: Decimal,
) -> VolatilityVerdict {
    if !config.enabled {
        return VolatilityVerdict::Allowed { extreme: false };
    }

    let Some(latest) = frame.last() else {
        return VolatilityVerdict::Rejected(RejectReason::LowAtr {
            atr: f64::NAN,
            threshold: config.min_atr_threshold,
        });
    };

    // Undefined ATR compares as "too low"
    if !(latest.atr >= config.min_atr_threshold) {
        return VolatilityVerdict::Rejected(RejectReason::LowAtr {
            atr: latest.atr,
            threshold: config.min_atr_threshold,
        });
    }

    let average = frame.trailing_atr_mean(config.avg_period);
    if latest.true_range < average {
        return VolatilityVerdict::Rejected(RejectReason::Contracting {
            current: latest.true_range,
            average,
        });
    }

    if let Some(cost) = symbol_info.and_then(|info| spread_cost(tick, info)) {
        let limit = target_usd.to_f64().unwrap_or(0.0) * MAX_SPREAD_COST_RATIO;
        if cost > limit {
            return VolatilityVerdict::Rejected(RejectReason::SpreadTooExpensive { cost, limit });
        }
    }

    VolatilityVerdict::Allowed {
        extreme: latest.atr > config.min_atr_threshold * config.extreme_vol_threshold,
    }
}

/// Account-currency cost of crossing the spread at the minimum volume.
pub fn spread_cost(tick: &Tick, info: &SymbolInfo) -> Option<f64> {
    if info.point <= 0.0 || info.tick_value <= 0.0 {
        return None;
    }
    let volume = info
        .volume_min
        .to_f64()
        .filter(|v| *v > 0.0)
        .unwrap_or(FALLBACK_MIN_VOLUME);
    Some(tick.spread() / info.point * info.tick_value * volume)
}
