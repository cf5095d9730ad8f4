//! Supervisor owning the gateway connection and the three engine loops.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use risk_manager::{AccountMonitor, AdaptiveScaling, MonitorExit, ProfitTarget, RiskMonitor};
use trading_engine::SignalScanner;
use velocity_core::config::BotConfig;
use velocity_core::gateway::{SerializedGateway, TradingGateway};
use velocity_core::store::ConfigStore;
use velocity_core::types::{aggregate_profit, AccountSnapshot, BotStatus, Position};

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    pub user_id: String,
    /// Configuration used until the store answers.
    pub fallback: BotConfig,
    pub account_monitor_enabled: bool,
    /// Bound on acquiring the gateway lock at start.
    pub connect_timeout: Duration,
    /// Bound on each loop's exit at stop.
    pub stop_timeout: Duration,
}

impl SupervisorOptions {
    pub fn new(user_id: impl Into<String>, fallback: BotConfig) -> Self {
        Self {
            user_id: user_id.into(),
            fallback,
            account_monitor_enabled: true,
            connect_timeout: Duration::from_secs(5),
            stop_timeout: Duration::from_secs(2),
        }
    }
}

/// Point-in-time view of the engine.
#[derive(Debug, Clone, Serialize)]
pub struct SupervisorStatus {
    pub scanner_running: bool,
    pub risk_monitor_running: bool,
    pub account_monitor_running: bool,
    pub account_monitor_exit: Option<MonitorExit>,
    pub gateway_connected: bool,
    pub account: Option<AccountSnapshot>,
    pub open_pl: Decimal,
    pub positions: Vec<Position>,
    /// Advisory profit target per configured symbol.
    pub profit_targets: Vec<(String, ProfitTarget)>,
}

pub struct Supervisor<G> {
    gateway: Arc<SerializedGateway<G>>,
    store: Arc<dyn ConfigStore>,
    options: SupervisorOptions,
    scanner: Arc<SignalScanner>,
    risk_monitor: Arc<RiskMonitor>,
    account_monitor: Arc<AccountMonitor>,
    scaling: AdaptiveScaling,
    /// Parent of the entry and exit loop tokens for the current session.
    /// The account monitor cancels it on a terminal event.
    halt: Mutex<Option<CancellationToken>>,
}

impl<G: TradingGateway + 'static> Supervisor<G> {
    pub fn new(gateway: Arc<SerializedGateway<G>>, store: Arc<dyn ConfigStore>, options: SupervisorOptions) -> Self {
        let shared: Arc<dyn TradingGateway> = gateway.clone();
        let user_id = options.user_id.clone();
        let fallback = options.fallback.clone();

        Self {
            scanner: Arc::new(SignalScanner::new(
                shared.clone(),
                store.clone(),
                user_id.clone(),
                fallback.clone(),
            )),
            risk_monitor: Arc::new(RiskMonitor::new(
                shared.clone(),
                store.clone(),
                user_id.clone(),
                fallback.clone(),
            )),
            account_monitor: Arc::new(AccountMonitor::new(shared.clone(), store.clone(), user_id, fallback)),
            scaling: AdaptiveScaling::new(shared),
            halt: Mutex::new(None),
            gateway,
            store,
            options,
        }
    }

    /// Connect the gateway and start every loop.
    ///
    /// Fails only if the gateway cannot be connected. Calling it while
    /// running is a no-op.
    pub async fn start(&self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }

        info!(user_id = %self.options.user_id, "Starting Velocity engine");
        self.gateway
            .connect_within(self.options.connect_timeout)
            .await
            .context("failed to connect trading gateway")?;

        let halt = CancellationToken::new();
        self.gateway.halt_orders_on(halt.clone());
        self.scanner.start_under(&halt);
        self.risk_monitor.start_under(&halt);
        if self.options.account_monitor_enabled {
            self.account_monitor.start_guarding(halt.clone());
        }
        *self.halt_slot() = Some(halt);

        let positions = self.gateway.positions().await;
        self.store
            .push_status(&BotStatus::running(
                &self.options.user_id,
                aggregate_profit(&positions),
                positions.len(),
            ))
            .await;

        info!("Velocity engine started");
        Ok(())
    }

    /// Stop every loop, waiting a bounded time for each.
    ///
    /// Returns `false` if any loop had to be aborted. The engine is stopped
    /// either way.
    pub async fn stop(&self) -> bool {
        let session = self.halt_slot().take();
        if session.is_none() && !self.is_running() && !self.account_monitor.is_running() {
            return true;
        }

        info!("Stopping Velocity engine");
        let timeout = self.options.stop_timeout;
        let (scanner, risk, account) = tokio::join!(
            self.scanner.stop_within(timeout),
            self.risk_monitor.stop_within(timeout),
            self.account_monitor.stop_within(timeout),
        );
        let clean = scanner && risk && account;
        if !clean {
            warn!(scanner, risk, account, "Engine loop did not stop in time");
        }

        self.store.push_status(&BotStatus::stopped(&self.options.user_id)).await;
        info!("Velocity engine stopped");
        clean
    }

    /// Resolve once the account monitor has locked the account for the day.
    ///
    /// By then the entry and exit loops have been told to stop and the
    /// gateway refuses new orders.
    pub async fn locked(&self) -> MonitorExit {
        loop {
            if let Some(exit) = self.account_monitor.last_exit().filter(MonitorExit::is_terminal) {
                return exit;
            }
            tokio::time::sleep(LOCK_POLL_INTERVAL).await;
        }
    }

    /// Whether the entry or exit loop is running. False after a lock.
    pub fn is_running(&self) -> bool {
        self.scanner.is_running() || self.risk_monitor.is_running()
    }

    /// Whether the current session was halted by the account monitor.
    pub fn is_halted(&self) -> bool {
        self.halt_slot().as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    fn halt_slot(&self) -> std::sync::MutexGuard<'_, Option<CancellationToken>> {
        self.halt.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub async fn status(&self) -> SupervisorStatus {
        let config = self
            .store
            .fetch_config(&self.options.user_id)
            .await
            .unwrap_or_else(|| self.options.fallback.clone());
        let account = self.gateway.account_info().await;
        let positions = self.gateway.positions().await;

        let mut profit_targets = Vec::with_capacity(config.strategy.symbols.len());
        for symbol in &config.strategy.symbols {
            let target = self.scaling.dynamic_target(symbol, &config.risk).await;
            profit_targets.push((symbol.clone(), target));
        }

        SupervisorStatus {
            scanner_running: self.scanner.is_running(),
            risk_monitor_running: self.risk_monitor.is_running(),
            account_monitor_running: self.account_monitor.is_running(),
            account_monitor_exit: self.account_monitor.last_exit(),
            gateway_connected: self.gateway.is_connected(),
            account,
            open_pl: aggregate_profit(&positions),
            positions,
            profit_targets,
        }
    }

    pub fn gateway(&self) -> &Arc<SerializedGateway<G>> {
        &self.gateway
    }

    pub fn scanner(&self) -> &Arc<SignalScanner> {
        &self.scanner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use velocity_core::gateway::PaperGateway;
    use velocity_core::store::MemoryStore;

    const USER: &str = "tester";

    fn supervisor(paper: PaperGateway) -> (Supervisor<PaperGateway>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let mut config = BotConfig::default();
        config.strategy.symbols = Vec::new();
        store.seed_config(USER, config.clone());
        let sup = Supervisor::new(
            Arc::new(SerializedGateway::new(paper)),
            store.clone(),
            SupervisorOptions::new(USER, config),
        );
        (sup, store)
    }

    #[tokio::test]
    async fn test_start_stop_lifecycle() {
        let (sup, store) = supervisor(PaperGateway::new(Decimal::new(1000, 0)));

        sup.start().await.unwrap();
        assert!(sup.is_running());
        let status = sup.status().await;
        assert!(status.scanner_running && status.risk_monitor_running && status.account_monitor_running);
        assert!(status.gateway_connected);
        assert_eq!(status.account.unwrap().balance, Decimal::new(1000, 0));

        // Second start is a no-op
        sup.start().await.unwrap();

        assert!(sup.stop().await);
        assert!(!sup.is_running());
        assert!(!store.last_status().unwrap().is_running);

        // Idempotent
        assert!(sup.stop().await);
    }

    #[tokio::test]
    async fn test_start_fails_when_gateway_refuses() {
        let paper = PaperGateway::new(Decimal::new(1000, 0));
        paper.set_connect_failure(true);
        let (sup, store) = supervisor(paper);

        assert!(sup.start().await.is_err());
        assert!(!sup.is_running());
        assert!(store.statuses().is_empty());
    }

    #[tokio::test]
    async fn test_hard_floor_locks_account() {
        let paper = PaperGateway::new(Decimal::new(1000, 0));
        let (sup, store) = supervisor(paper);
        let mut config = BotConfig::default();
        config.strategy.symbols = Vec::new();
        config.risk.monitor_interval_ms = 10;
        store.seed_config(USER, config);

        sup.start().await.unwrap();
        // Let the monitor capture the 1000 day-start balance first
        tokio::time::sleep(Duration::from_millis(50)).await;
        sup.gateway().inner().set_balance(Decimal::new(940, 0));

        let exit = tokio::time::timeout(Duration::from_secs(2), sup.locked()).await.unwrap();
        assert!(matches!(exit, MonitorExit::LossBreach { hard_floor: true, .. }));
        assert_eq!(store.is_active(USER), Some(false));
        assert_eq!(store.notifications().len(), 1);

        assert!(sup.is_halted());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!sup.is_running());

        let status = sup.status().await;
        assert!(!status.account_monitor_running);
        assert!(!status.scanner_running && !status.risk_monitor_running);
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["account_monitor_exit"]["exit"], "loss_breach");

        assert!(sup.stop().await);
        assert!(!store.last_status().unwrap().is_running);
        assert!(!sup.is_halted());
    }

    #[tokio::test]
    async fn test_account_monitor_optional() {
        let store = Arc::new(MemoryStore::new());
        let mut options = SupervisorOptions::new(USER, BotConfig::default());
        options.account_monitor_enabled = false;
        let sup = Supervisor::new(
            Arc::new(SerializedGateway::new(PaperGateway::new(Decimal::new(1000, 0)))),
            store,
            options,
        );

        sup.start().await.unwrap();
        assert!(!sup.status().await.account_monitor_running);
        assert!(sup.stop().await);
    }
}
