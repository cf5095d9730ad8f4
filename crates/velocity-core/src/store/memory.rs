//! In-memory store, used by paper mode and tests.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use super::ConfigStore;
use crate::config::{BotConfig, BotConfigUpdate};
use crate::types::{AccountSnapshot, BotStatus, Notification, Position, TradeAction};

/// Most recent records kept per history; older ones are dropped.
pub const HISTORY_LIMIT: usize = 1000;

#[derive(Debug, Default)]
struct StoreState {
    configs: HashMap<String, BotConfig>,
    active: HashMap<String, bool>,
    statuses: VecDeque<BotStatus>,
    trades: VecDeque<TradeAction>,
    snapshots: VecDeque<AccountSnapshot>,
    positions: Vec<Position>,
    position_syncs: usize,
    notifications: VecDeque<Notification>,
}

fn push_capped<T>(history: &mut VecDeque<T>, record: T) {
    if history.len() == HISTORY_LIMIT {
        history.pop_front();
    }
    history.push_back(record);
}

/// Store that keeps the latest [`HISTORY_LIMIT`] records of each kind in
/// memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
    reads_failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or replace) the configuration for a user and mark it active.
    pub fn seed_config(&self, user_id: &str, config: BotConfig) {
        let mut state = self.write();
        state.configs.insert(user_id.to_string(), config);
        state.active.insert(user_id.to_string(), true);
    }

    /// Merge a partial update into a user's configuration.
    pub fn update_config(&self, user_id: &str, update: &BotConfigUpdate) -> BotConfig {
        let mut state = self.write();
        let config = state.configs.entry(user_id.to_string()).or_default();
        config.apply(update);
        config.clone()
    }

    /// Simulate an unreachable store for config reads.
    pub fn set_reads_failing(&self, failing: bool) {
        self.reads_failing.store(failing, Ordering::SeqCst);
    }

    pub fn is_active(&self, user_id: &str) -> Option<bool> {
        self.read().active.get(user_id).copied()
    }

    pub fn statuses(&self) -> Vec<BotStatus> {
        self.read().statuses.iter().cloned().collect()
    }

    pub fn last_status(&self) -> Option<BotStatus> {
        self.read().statuses.back().cloned()
    }

    pub fn trades(&self) -> Vec<TradeAction> {
        self.read().trades.iter().cloned().collect()
    }

    pub fn snapshots(&self) -> Vec<AccountSnapshot> {
        self.read().snapshots.iter().cloned().collect()
    }

    pub fn positions(&self) -> Vec<Position> {
        self.read().positions.clone()
    }

    pub fn position_syncs(&self) -> usize {
        self.read().position_syncs
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.read().notifications.iter().cloned().collect()
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn fetch_config(&self, user_id: &str) -> Option<BotConfig> {
        if self.reads_failing.load(Ordering::SeqCst) {
            return None;
        }
        self.read().configs.get(user_id).cloned()
    }

    async fn push_status(&self, status: &BotStatus) {
        debug!(
            running = status.is_running,
            open_pl = %status.open_pl,
            positions = status.position_count,
            "Bot status pushed"
        );
        push_capped(&mut self.write().statuses, status.clone());
    }

    async fn push_trade(&self, action: &TradeAction) {
        debug!(action = action.action.as_str(), profit = %action.profit, "Trade pushed");
        push_capped(&mut self.write().trades, action.clone());
    }

    async fn push_account_snapshot(&self, snapshot: &AccountSnapshot) {
        push_capped(&mut self.write().snapshots, snapshot.clone());
    }

    async fn sync_positions(&self, positions: &[Position]) {
        let mut state = self.write();
        state.positions.clear();
        state.positions.extend_from_slice(positions);
        state.position_syncs += 1;
    }

    async fn push_notification(&self, notification: &Notification) {
        debug!(level = ?notification.level, message = %notification.message, "Notification pushed");
        push_capped(&mut self.write().notifications, notification.clone());
    }

    async fn set_active(&self, user_id: &str, active: bool) {
        debug!(user_id = %user_id, active, "Bot active status updated");
        self.write().active.insert(user_id.to_string(), active);
    }
}
