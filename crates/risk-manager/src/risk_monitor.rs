//! Risk monitor: the exit loop.
//!
//! Each iteration mirrors positions to the store, publishes a heartbeat,
//! closes everything on the profit-take or max-loss threshold and publishes
//! an account snapshot. A failed iteration is logged and the loop carries on.

use anyhow::{bail, Result};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use velocity_core::config::{BotConfig, ConfigCache, RiskConfig};
use velocity_core::gateway::TradingGateway;
use velocity_core::store::ConfigStore;
use velocity_core::types::{aggregate_profit, BotStatus, CloseAllSummary, Position};
use velocity_core::worker::{sleep_or_cancel, Worker, DEFAULT_STOP_TIMEOUT};

use crate::circuit_breaker::{evaluate_pnl, RiskAction, TripReason};

/// Result of one threshold check.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskCheck {
    pub aggregate: Decimal,
    pub position_count: usize,
    pub action: Option<RiskAction>,
    /// Present when a close-all was sent.
    pub closed: Option<CloseAllSummary>,
}

impl RiskCheck {
    pub fn triggered(&self) -> bool {
        self.action.is_some()
    }

    pub fn reason(&self) -> Option<TripReason> {
        self.action.as_ref().map(RiskAction::reason)
    }
}

pub struct RiskMonitor {
    gateway: Arc<dyn TradingGateway>,
    store: Arc<dyn ConfigStore>,
    user_id: String,
    fallback: BotConfig,
    worker: Worker,
}

impl RiskMonitor {
    pub fn new(
        gateway: Arc<dyn TradingGateway>,
        store: Arc<dyn ConfigStore>,
        user_id: impl Into<String>,
        fallback: BotConfig,
    ) -> Self {
        Self {
            gateway,
            store,
            user_id: user_id.into(),
            fallback,
            worker: Worker::new("risk-monitor"),
        }
    }

    /// Start the exit loop. No-op if it is already running.
    pub fn start(self: &Arc<Self>) -> bool {
        let monitor = Arc::clone(self);
        self.worker.start(move |token| async move { monitor.run(token).await })
    }

    /// Start the exit loop so that cancelling `halt` also ends it.
    pub fn start_under(self: &Arc<Self>, halt: &CancellationToken) -> bool {
        let monitor = Arc::clone(self);
        self.worker.start_under(halt, move |token| async move { monitor.run(token).await })
    }

    pub async fn stop(&self) -> bool {
        self.worker.stop(DEFAULT_STOP_TIMEOUT).await
    }

    pub async fn stop_within(&self, timeout: Duration) -> bool {
        self.worker.stop(timeout).await
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_running()
    }

    async fn run(&self, token: CancellationToken) {
        let mut cache = ConfigCache::new(self.user_id.clone(), self.fallback.clone());
        info!(user_id = %self.user_id, "Risk monitor started");

        while !token.is_cancelled() {
            let config = cache.refresh(self.store.as_ref()).await;

            if let Err(e) = self.iterate(&config.risk).await {
                error!(error = %e, "Risk monitor iteration failed");
            }

            if !sleep_or_cancel(&token, config.strategy.profit_check_interval()).await {
                break;
            }
        }

        info!("Risk monitor stopped");
    }

    /// One monitoring pass: sync, heartbeat, thresholds, snapshot.
    pub async fn iterate(&self, risk: &RiskConfig) -> Result<RiskCheck> {
        if !self.gateway.is_connected() {
            bail!("gateway not connected");
        }

        let positions = self.gateway.positions().await;
        self.store.sync_positions(&positions).await;

        let aggregate = aggregate_profit(&positions);
        self.store
            .push_status(&BotStatus::running(&self.user_id, aggregate, positions.len()))
            .await;

        let check = self.check_risk(&positions, risk).await;

        if let Some(account) = self.gateway.account_info().await {
            self.store.push_account_snapshot(&account).await;
        }

        Ok(check)
    }

    /// Evaluate `positions` against the profit-take and max-loss thresholds,
    /// closing everything if one is hit.
    pub async fn check_risk(&self, positions: &[Position], risk: &RiskConfig) -> RiskCheck {
        let aggregate = aggregate_profit(positions);
        let mut check = RiskCheck {
            aggregate,
            position_count: positions.len(),
            action: None,
            closed: None,
        };
        if positions.is_empty() {
            return check;
        }

        let equity = self.gateway.account_info().await.map(|a| a.equity);
        let Some(action) = evaluate_pnl(aggregate, equity, risk) else {
            debug!(aggregate = %aggregate, positions = positions.len(), "Risk within limits");
            return check;
        };

        let summary = self.gateway.close_all_orders().await;
        match &action {
            RiskAction::TakeProfit { profit, .. } => info!(
                profit = %profit.round_dp(2),
                closed = summary.closed,
                "Profit target hit, closed all positions"
            ),
            RiskAction::CircuitBreaker { profit, percent, .. } => error!(
                profit = %profit.round_dp(2),
                percent = %percent,
                closed = summary.closed,
                "CIRCUIT BREAKER: max loss hit, closed all positions"
            ),
        }
        for failure in &summary.errors {
            warn!(ticket = failure.ticket, error = %failure.error, "Position close failed");
        }

        self.store.push_trade(&action.to_trade_action(summary.closed)).await;
        check.action = Some(action);
        check.closed = Some(summary);
        check
    }
}
