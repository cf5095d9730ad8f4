//! Account monitor: sub-second supervisory loop enforcing daily limits.
//!
//! Runs independently of the risk monitor. On a loss breach (configured
//! daily limit or the 95% hard floor) or on reaching the daily profit target
//! it halts trading, closes every position, deactivates the bot, notifies
//! the user and exits. It does not restart itself.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use velocity_core::config::{BotConfig, ConfigCache};
use velocity_core::gateway::TradingGateway;
use velocity_core::store::ConfigStore;
use velocity_core::types::{Notification, NotificationLevel};
use velocity_core::worker::{sleep_or_cancel, Worker, DEFAULT_STOP_TIMEOUT};

use crate::circuit_breaker::{evaluate_daily_limits, DailyMetrics, DailyVerdict};

/// Wait between polls while the account is unavailable.
const ACCOUNT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Why the monitor loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "exit", rename_all = "snake_case")]
pub enum MonitorExit {
    /// Stop was requested.
    Stopped,
    LossBreach { loss_pct: Decimal, hard_floor: bool },
    ProfitLock { profit_pct: Decimal },
}

impl MonitorExit {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Stopped)
    }
}

pub struct AccountMonitor {
    gateway: Arc<dyn TradingGateway>,
    store: Arc<dyn ConfigStore>,
    user_id: String,
    fallback: BotConfig,
    worker: Worker,
    last_exit: Mutex<Option<MonitorExit>>,
}

impl AccountMonitor {
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
            worker: Worker::new("account-monitor"),
            last_exit: Mutex::new(None),
        }
    }

    /// Start the monitor. No-op if it is already running.
    pub fn start(self: &Arc<Self>) -> bool {
        self.start_guarding(CancellationToken::new())
    }

    /// Start the monitor with a halt token that is cancelled on a terminal
    /// event, before any position is closed. Loops started under `halt`
    /// stop with it.
    pub fn start_guarding(self: &Arc<Self>, halt: CancellationToken) -> bool {
        if !self.is_running() {
            *self.last_exit.lock().unwrap_or_else(|e| e.into_inner()) = None;
        }
        let monitor = Arc::clone(self);
        self.worker.start(move |token| async move {
            let exit = monitor.run_guarding(token, &halt).await;
            *monitor.last_exit.lock().unwrap_or_else(|e| e.into_inner()) = Some(exit);
        })
    }

    pub async fn stop(&self) -> bool {
        self.worker.stop(DEFAULT_STOP_TIMEOUT).await
    }

    pub async fn stop_within(&self, timeout: Duration) -> bool {
        self.worker.stop(timeout).await
    }

    /// False once stopped or after a terminal risk event.
    pub fn is_running(&self) -> bool {
        self.worker.is_running()
    }

    /// How the most recent run ended, if it has.
    pub fn last_exit(&self) -> Option<MonitorExit> {
        *self.last_exit.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run the monitor until stopped or until a terminal event fires.
    pub async fn run(&self, token: CancellationToken) -> MonitorExit {
        self.run_guarding(token, &CancellationToken::new()).await
    }

    /// [`AccountMonitor::run`], cancelling `halt` on a terminal event.
    pub async fn run_guarding(&self, token: CancellationToken, halt: &CancellationToken) -> MonitorExit {
        let mut cache = ConfigCache::new(self.user_id.clone(), self.fallback.clone());
        let mut config = cache.refresh(self.store.as_ref()).await;

        let mut start_balance = match self.gateway.account_info().await {
            Some(account) => Some(account.balance),
            None => {
                warn!(user_id = %self.user_id, "Could not fetch initial balance, waiting for account");
                None
            }
        };
        info!(
            user_id = %self.user_id,
            start_balance = ?start_balance,
            interval_ms = config.risk.monitor_interval_ms,
            "Account monitor started"
        );

        loop {
            if token.is_cancelled() {
                break;
            }

            let Some(account) = self.gateway.account_info().await else {
                if !sleep_or_cancel(&token, ACCOUNT_RETRY_DELAY).await {
                    break;
                }
                continue;
            };
            let start = *start_balance.get_or_insert_with(|| {
                info!(balance = %account.balance, "Day-start balance captured");
                account.balance
            });

            let positions = self.gateway.positions().await;
            let metrics = DailyMetrics::compute(start, account.equity, &positions);
            debug!(
                equity = %metrics.equity,
                loss_pct = %metrics.loss_pct.round_dp(2),
                profit_pct = %metrics.profit_pct.round_dp(2),
                "Account check"
            );

            match evaluate_daily_limits(&metrics, &config.risk) {
                DailyVerdict::Hold => {}
                DailyVerdict::LossBreach { loss_pct, hard_floor } => {
                    halt.cancel();
                    self.lockdown(loss_pct, hard_floor).await;
                    return MonitorExit::LossBreach { loss_pct, hard_floor };
                }
                DailyVerdict::ProfitLock { profit_pct } => {
                    halt.cancel();
                    self.profit_lock(profit_pct).await;
                    return MonitorExit::ProfitLock { profit_pct };
                }
            }

            if !sleep_or_cancel(&token, config.risk.monitor_interval()).await {
                break;
            }
            config = cache.refresh(self.store.as_ref()).await;
        }

        info!("Account monitor stopped");
        MonitorExit::Stopped
    }

    async fn lockdown(&self, loss_pct: Decimal, hard_floor: bool) {
        let loss_pct = loss_pct.round_dp(2);
        error!(
            user_id = %self.user_id,
            loss_pct = %loss_pct,
            hard_floor,
            "CRITICAL: risk limit hit, closing all positions"
        );

        let summary = self.gateway.close_all_orders().await;
        if !summary.is_clean() {
            warn!(failed = summary.errors.len(), "Some positions failed to close");
        }
        self.store.set_active(&self.user_id, false).await;
        let message = format!(
            "CRITICAL: Loss limit reached ({:.2}%). All positions closed. Bot deactivated.",
            loss_pct
        );
        self.store
            .push_notification(&Notification::new(&self.user_id, message, NotificationLevel::Critical))
            .await;
    }

    async fn profit_lock(&self, profit_pct: Decimal) {
        let profit_pct = profit_pct.round_dp(2);
        info!(user_id = %self.user_id, profit_pct = %profit_pct, "Profit target hit, pausing");

        let summary = self.gateway.close_all_orders().await;
        if !summary.is_clean() {
            warn!(failed = summary.errors.len(), "Some positions failed to close");
        }
        self.store.set_active(&self.user_id, false).await;
        let message = format!(
            "SUCCESS: Profit target reached ({:.2}%). Positions closed. Bot paused for the day.",
            profit_pct
        );
        self.store
            .push_notification(&Notification::new(&self.user_id, message, NotificationLevel::Success))
            .await;
    }
}
