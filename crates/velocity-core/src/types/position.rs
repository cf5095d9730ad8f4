//! Open position types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::OrderSide;

/// An open position held by the trading terminal.
///
/// The engines only read positions and request their closure; they never
/// mutate one directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Terminal-assigned unique ticket.
    pub ticket: u64,
    pub symbol: String,
    #[serde(rename = "type")]
    pub side: OrderSide,
    pub volume: Decimal,
    pub open_price: f64,
    pub current_price: f64,
    /// Floating profit in account currency.
    pub profit: Decimal,
    pub swap: Decimal,
    pub comment: String,
    pub opened_at: DateTime<Utc>,
}

/// Sum of floating profit across positions.
pub fn aggregate_profit(positions: &[Position]) -> Decimal {
    positions.iter().map(|p| p.profit).sum()
}

/// Sum of the profit of losing positions only (zero or negative).
pub fn floating_loss(positions: &[Position]) -> Decimal {
    positions
        .iter()
        .map(|p| p.profit)
        .filter(|p| p.is_sign_negative() && !p.is_zero())
        .sum()
}
