//! Account snapshot as reported by the trading terminal.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Read-only projection of the broker account, refreshed on every poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub login: u64,
    pub server: String,
    pub balance: Decimal,
    pub equity: Decimal,
    pub margin: Decimal,
    pub free_margin: Decimal,
    /// Floating profit across all open positions.
    pub profit: Decimal,
    pub currency: String,
}
