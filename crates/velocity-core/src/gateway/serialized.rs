//! Single serialization point for a trading gateway.

use async_trait::async_trait;
use std::sync::RwLock;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::TradingGateway;
use crate::error::{Error, GatewayError, Result};
use crate::types::{
    AccountSnapshot, Candle, CloseAllSummary, ClosedPosition, OrderFill, OrderRequest, Position,
    SymbolInfo, Tick, Timeframe,
};

/// Wraps a gateway so that every call, including connection lifecycle and
/// order sends, holds one async mutex for its duration.
///
/// The terminal connection tolerates exactly one in-flight operation; the
/// scanner and both monitors share one of these.
///
/// Order sends can be gated on a halt token. Once it is cancelled, every
/// `open_order` that reaches the lock is refused, so a close-all sweep that
/// starts after the cancel cannot be followed by a new fill.
pub struct SerializedGateway<G> {
    inner: G,
    lock: Mutex<()>,
    halt: RwLock<Option<CancellationToken>>,
}

impl<G: TradingGateway> SerializedGateway<G> {
    pub fn new(inner: G) -> Self {
        Self {
            inner,
            lock: Mutex::new(()),
            halt: RwLock::new(None),
        }
    }

    /// Refuse new orders once `halt` is cancelled. Replaces any earlier token.
    pub fn halt_orders_on(&self, halt: CancellationToken) {
        *self.halt.write().unwrap_or_else(|e| e.into_inner()) = Some(halt);
    }

    fn orders_halted(&self) -> bool {
        self.halt
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    /// Access the wrapped gateway without taking the lock.
    pub fn inner(&self) -> &G {
        &self.inner
    }

    /// Connect, giving up if the serialization lock cannot be taken in time.
    pub async fn connect_within(&self, timeout: Duration) -> Result<()> {
        let _guard = tokio::time::timeout(timeout, self.lock.lock())
            .await
            .map_err(|_| {
                warn!(timeout_ms = timeout.as_millis() as u64, "Gateway lock not acquired");
                Error::Connectivity {
                    message: "timed out waiting for the gateway connection lock".to_string(),
                }
            })?;

        if self.inner.is_connected() {
            return Ok(());
        }

        self.inner.connect().await?;
        info!("Gateway connected");
        Ok(())
    }
}

#[async_trait]
impl<G: TradingGateway> TradingGateway for SerializedGateway<G> {
    async fn connect(&self) -> std::result::Result<(), GatewayError> {
        let _guard = self.lock.lock().await;
        self.inner.connect().await
    }

    async fn disconnect(&self) {
        let _guard = self.lock.lock().await;
        self.inner.disconnect().await
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    async fn account_info(&self) -> Option<AccountSnapshot> {
        let _guard = self.lock.lock().await;
        self.inner.account_info().await
    }

    async fn positions(&self) -> Vec<Position> {
        let _guard = self.lock.lock().await;
        self.inner.positions().await
    }

    async fn tick(&self, symbol: &str) -> Option<Tick> {
        let _guard = self.lock.lock().await;
        self.inner.tick(symbol).await
    }

    async fn candles(&self, symbol: &str, timeframe: Timeframe, count: usize) -> Option<Vec<Candle>> {
        let _guard = self.lock.lock().await;
        self.inner.candles(symbol, timeframe, count).await
    }

    async fn symbol_info(&self, symbol: &str) -> Option<SymbolInfo> {
        let _guard = self.lock.lock().await;
        self.inner.symbol_info(symbol).await
    }

    async fn select_symbol(&self, symbol: &str) -> bool {
        let _guard = self.lock.lock().await;
        self.inner.select_symbol(symbol).await
    }

    async fn open_order(&self, request: &OrderRequest) -> std::result::Result<OrderFill, GatewayError> {
        let _guard = self.lock.lock().await;
        // Checked under the lock so it orders against close_all_orders.
        if self.orders_halted() {
            warn!(symbol = %request.symbol, "Order refused, trading halted");
            return Err(GatewayError::TradingHalted);
        }
        self.inner.open_order(request).await
    }

    async fn close_order(&self, ticket: u64) -> std::result::Result<ClosedPosition, GatewayError> {
        let _guard = self.lock.lock().await;
        self.inner.close_order(ticket).await
    }

    async fn close_all_orders(&self) -> CloseAllSummary {
        // Held across the whole sweep so no order can interleave with it.
        let _guard = self.lock.lock().await;
        self.inner.close_all_orders().await
    }
}
