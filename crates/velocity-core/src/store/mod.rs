//! Configuration/logging store contract.
//!
//! The store supplies strategy and risk parameters and receives heartbeats,
//! trade-action logs, account snapshots, the position mirror and
//! notifications. Every write is fire-and-forget: implementations log and
//! drop their own failures and never block or fail the calling loop.

pub mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;

use crate::config::BotConfig;
use crate::types::{AccountSnapshot, BotStatus, Notification, Position, TradeAction};

#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Latest configuration for a user, or `None` if the store is unreachable
    /// or has nothing for that user.
    async fn fetch_config(&self, user_id: &str) -> Option<BotConfig>;

    /// Upsert the heartbeat/status row.
    async fn push_status(&self, status: &BotStatus);

    /// Append a trade-action log entry.
    async fn push_trade(&self, action: &TradeAction);

    /// Append an account snapshot.
    async fn push_account_snapshot(&self, snapshot: &AccountSnapshot);

    /// Replace the mirrored position set (clear, then reinsert).
    async fn sync_positions(&self, positions: &[Position]);

    /// Append a user notification.
    async fn push_notification(&self, notification: &Notification);

    /// Persist the bot's active flag.
    async fn set_active(&self, user_id: &str, active: bool);
}
