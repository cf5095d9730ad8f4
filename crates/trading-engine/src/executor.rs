//! Order submission through the trading gateway.

use rust_decimal::Decimal;
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tracing::{debug, info, warn};
use velocity_core::error::GatewayError;
use velocity_core::gateway::TradingGateway;
use velocity_core::types::{OrderFill, OrderRequest};

/// Metrics for order execution performance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionMetrics {
    pub orders_submitted: u64,
    pub orders_filled: u64,
    pub orders_rejected: u64,
    pub total_volume: Decimal,
    pub avg_latency_us: u64,
}

/// Sends market orders and keeps execution metrics.
///
/// Rejections are returned to the caller as-is; there is no retry within a
/// call.
pub struct OrderExecutor {
    gateway: Arc<dyn TradingGateway>,
    metrics: RwLock<ExecutionMetrics>,
}

impl OrderExecutor {
    pub fn new(gateway: Arc<dyn TradingGateway>) -> Self {
        Self {
            gateway,
            metrics: RwLock::new(ExecutionMetrics::default()),
        }
    }

    /// Execute a market order.
    pub async fn execute_market_order(&self, request: &OrderRequest) -> Result<OrderFill, GatewayError> {
        let start = Instant::now();

        info!(
            symbol = %request.symbol,
            side = %request.side,
            volume = %request.volume,
            comment = %request.comment,
            "Executing market order"
        );

        let result = self.gateway.open_order(request).await;
        let latency_us = start.elapsed().as_micros() as u64;

        {
            let mut metrics = self.metrics.write().unwrap_or_else(|e| e.into_inner());
            metrics.orders_submitted += 1;
            match &result {
                Ok(fill) => {
                    metrics.orders_filled += 1;
                    metrics.total_volume += fill.volume;
                }
                Err(_) => metrics.orders_rejected += 1,
            }
            metrics.avg_latency_us = (metrics.avg_latency_us * (metrics.orders_submitted - 1)
                + latency_us)
                / metrics.orders_submitted;
        }

        match &result {
            Ok(fill) => debug!(
                ticket = fill.ticket,
                price = fill.price,
                latency_us,
                "Order execution complete"
            ),
            Err(e) => warn!(
                symbol = %request.symbol,
                side = %request.side,
                error = %e,
                "Order rejected"
            ),
        }

        result
    }

    /// Get current execution metrics.
    pub fn metrics(&self) -> ExecutionMetrics {
        self.metrics.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}
