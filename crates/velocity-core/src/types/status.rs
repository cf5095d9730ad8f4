//! Records written to the configuration/logging store.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Heartbeat published by the monitoring loops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotStatus {
    pub user_id: String,
    pub is_running: bool,
    pub open_pl: Decimal,
    pub position_count: usize,
    pub updated_at: DateTime<Utc>,
}

impl BotStatus {
    pub fn running(user_id: impl Into<String>, open_pl: Decimal, position_count: usize) -> Self {
        Self {
            user_id: user_id.into(),
            is_running: true,
            open_pl: open_pl.round_dp(2),
            position_count,
            updated_at: Utc::now(),
        }
    }

    pub fn stopped(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            is_running: false,
            open_pl: Decimal::ZERO,
            position_count: 0,
            updated_at: Utc::now(),
        }
    }
}

/// Kind of automated trade action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeActionKind {
    /// Aggregate floating profit reached the small-profit threshold.
    SmallProfitClose,
    /// Aggregate floating loss breached the equity-percentage limit.
    MaxLossCircuitBreaker,
}

impl TradeActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeActionKind::SmallProfitClose => "small_profit_close",
            TradeActionKind::MaxLossCircuitBreaker => "max_loss_circuit_breaker",
        }
    }
}

/// Trade-action log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeAction {
    pub action: TradeActionKind,
    /// Aggregate floating profit at the time of the action.
    pub profit: Decimal,
    pub threshold: Decimal,
    /// Loss percentage used, for circuit-breaker entries.
    pub percent: Option<Decimal>,
    pub positions_closed: usize,
    pub timestamp: DateTime<Utc>,
}

/// Severity of a user notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Warning,
    Critical,
    Success,
}

/// Dashboard notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: String,
    pub message: String,
    pub level: NotificationLevel,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(user_id: impl Into<String>, message: impl Into<String>, level: NotificationLevel) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            message: message.into(),
            level,
            read: false,
            created_at: Utc::now(),
        }
    }
}
