//! Trading gateway contract.
//!
//! The gateway is the single connection to the trading terminal. Every call
//! is a bounded request/response and reports failure through its return
//! value. Implementations are not required to be internally serialized; wrap
//! them in [`SerializedGateway`] before sharing them between loops.

pub mod paper;
pub mod serialized;

pub use paper::PaperGateway;
pub use serialized::SerializedGateway;

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::types::{
    AccountSnapshot, Candle, CloseAllSummary, ClosedPosition, OrderFill, OrderRequest, Position,
    SymbolInfo, Tick, Timeframe,
};

#[async_trait]
pub trait TradingGateway: Send + Sync {
    /// Initialize and log in to the terminal.
    async fn connect(&self) -> Result<(), GatewayError>;

    /// Shut the terminal connection down.
    async fn disconnect(&self);

    fn is_connected(&self) -> bool;

    /// Current account metrics, or `None` when not connected.
    async fn account_info(&self) -> Option<AccountSnapshot>;

    /// All open positions; empty when not connected.
    async fn positions(&self) -> Vec<Position>;

    /// Latest bid/ask, or `None` if the symbol has no price (or is not selected).
    async fn tick(&self, symbol: &str) -> Option<Tick>;

    /// The `count` most recent candles, oldest first. The last one is the
    /// currently forming bar.
    async fn candles(&self, symbol: &str, timeframe: Timeframe, count: usize) -> Option<Vec<Candle>>;

    async fn symbol_info(&self, symbol: &str) -> Option<SymbolInfo>;

    /// Register a symbol in the terminal's market watch. Returns `true` on success.
    async fn select_symbol(&self, symbol: &str) -> bool;

    /// Send a market order.
    async fn open_order(&self, request: &OrderRequest) -> Result<OrderFill, GatewayError>;

    /// Close a single position by ticket.
    async fn close_order(&self, ticket: u64) -> Result<ClosedPosition, GatewayError>;

    /// Close every open position, collecting per-ticket failures.
    async fn close_all_orders(&self) -> CloseAllSummary;
}
