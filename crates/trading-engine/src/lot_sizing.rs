//! Equity-based lot sizing.

use rust_decimal::{Decimal, RoundingStrategy};
use velocity_core::config::RiskConfig;
use velocity_core::types::SymbolInfo;

/// Conventional smallest tradable volume.
pub const SAFE_MIN_LOT: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

const EQUITY_UNIT: Decimal = Decimal::from_parts(1000, 0, 0, false, 0);

/// Volume for a new order.
///
/// With auto-sizing on and equity known, `lot = equity / 1000 * multiplier`,
/// rounded to the nearest volume step and clamped to the broker bounds.
/// Otherwise the safe minimum, still clamped to the broker bounds. Without
/// symbol metadata the lot is rounded to two decimals with a 0.01 floor.
pub fn calculate_lot(equity: Option<Decimal>, risk: &RiskConfig, info: Option<&SymbolInfo>) -> Decimal {
    let raw = match equity {
        Some(equity) if risk.auto_lot_enabled => equity / EQUITY_UNIT * risk.risk_multiplier,
        _ => return clamp_to_broker(SAFE_MIN_LOT, info),
    };

    match info {
        Some(info) => clamp_to_broker(quantize(raw, info.volume_step), Some(info)),
        None => raw.round_dp(2).max(SAFE_MIN_LOT),
    }
}

/// Round `lot` to the nearest multiple of `step`.
fn quantize(lot: Decimal, step: Decimal) -> Decimal {
    if step <= Decimal::ZERO {
        return lot;
    }
    (lot / step).round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven) * step
}

fn clamp_to_broker(lot: Decimal, info: Option<&SymbolInfo>) -> Decimal {
    match info {
        // An inverted range from the broker still must not go below the minimum
        Some(info) => lot.min(info.volume_max).max(info.volume_min).normalize(),
        None => lot,
    }
}
