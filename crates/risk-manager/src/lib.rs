//! Risk Manager
//!
//! Profit-take and circuit-breaker policies, the risk monitor exit loop, the
//! account monitor enforcing daily limits, and adaptive profit targets.

pub mod account_monitor;
pub mod adaptive_scaling;
pub mod circuit_breaker;
pub mod risk_monitor;

pub use account_monitor::{AccountMonitor, MonitorExit};
pub use adaptive_scaling::{AdaptiveScaling, ProfitTarget};
pub use circuit_breaker::{
    evaluate_daily_limits, evaluate_pnl, DailyMetrics, DailyVerdict, RiskAction, TripReason,
};
pub use risk_monitor::{RiskCheck, RiskMonitor};
