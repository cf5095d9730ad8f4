//! Order types for trading execution.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of an order or position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => f.write_str("BUY"),
            OrderSide::Sell => f.write_str("SELL"),
        }
    }
}

/// A market order request sent to the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub volume: Decimal,
    pub side: OrderSide,
    /// Stop-loss price, if any.
    pub sl: Option<f64>,
    /// Take-profit price, if any.
    pub tp: Option<f64>,
    pub comment: String,
}

impl OrderRequest {
    pub fn market(symbol: impl Into<String>, side: OrderSide, volume: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            volume,
            side,
            sl: None,
            tp: None,
            comment: "Velocity".to_string(),
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }
}

/// A filled market order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderFill {
    pub ticket: u64,
    pub price: f64,
    pub volume: Decimal,
}

/// A closed position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedPosition {
    pub ticket: u64,
    pub close_price: f64,
    pub profit: Decimal,
}

/// A per-ticket close failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloseFailure {
    pub ticket: u64,
    pub error: String,
}

/// Outcome of closing every open position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CloseAllSummary {
    pub closed: usize,
    pub realized: Decimal,
    pub errors: Vec<CloseFailure>,
}

impl CloseAllSummary {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}
