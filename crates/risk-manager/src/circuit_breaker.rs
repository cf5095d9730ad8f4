//! Threshold policies for emergency closes and daily account limits.
//!
//! These are pure functions over account and position figures. The risk and
//! account monitors call them once per iteration and act on the result.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use velocity_core::config::RiskConfig;
use velocity_core::types::{floating_loss, Position, TradeAction, TradeActionKind};

/// Equity assumed for the max-loss threshold when the account is unavailable.
pub const FALLBACK_EQUITY: Decimal = Decimal::from_parts(1000, 0, 0, false, 0);

/// Share of the day-start balance below which the account is always locked.
pub const HARD_FLOOR_RATIO: Decimal = Decimal::from_parts(95, 0, 0, false, 2);

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Reason for a close-all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripReason {
    /// Aggregate profit reached the small-profit target.
    SmallProfit,
    /// Aggregate loss breached the equity-percentage limit.
    MaxLoss,
    /// Floating loss breached the daily loss limit.
    DailyLossLimit,
    /// Equity fell to the hard floor.
    HardFloor,
    /// Daily P&L reached the profit target.
    DailyProfitTarget,
}

/// Close-all decision from the per-cycle P&L check.
#[derive(Debug, Clone, PartialEq)]
pub enum RiskAction {
    TakeProfit {
        profit: Decimal,
        threshold: Decimal,
    },
    CircuitBreaker {
        profit: Decimal,
        threshold: Decimal,
        percent: Decimal,
    },
}

impl RiskAction {
    pub fn reason(&self) -> TripReason {
        match self {
            Self::TakeProfit { .. } => TripReason::SmallProfit,
            Self::CircuitBreaker { .. } => TripReason::MaxLoss,
        }
    }

    pub fn kind(&self) -> TradeActionKind {
        match self {
            Self::TakeProfit { .. } => TradeActionKind::SmallProfitClose,
            Self::CircuitBreaker { .. } => TradeActionKind::MaxLossCircuitBreaker,
        }
    }

    /// Trade-log entry for this action after `positions_closed` closes.
    pub fn to_trade_action(&self, positions_closed: usize) -> TradeAction {
        let (profit, threshold, percent) = match self {
            Self::TakeProfit { profit, threshold } => (*profit, *threshold, None),
            Self::CircuitBreaker {
                profit,
                threshold,
                percent,
            } => (*profit, threshold.round_dp(2), Some(*percent)),
        };
        TradeAction {
            action: self.kind(),
            profit: profit.round_dp(2),
            threshold,
            percent,
            positions_closed,
            timestamp: Utc::now(),
        }
    }
}

/// Loss (as a negative amount) at which the circuit breaker trips.
pub fn max_loss_threshold(equity: Decimal, max_loss_percent: Decimal) -> Decimal {
    -(equity * max_loss_percent / HUNDRED)
}

/// Evaluate aggregate floating profit against the profit-take and max-loss
/// thresholds.
///
/// Profit-take is checked first, so at most one action comes back.
pub fn evaluate_pnl(aggregate: Decimal, equity: Option<Decimal>, risk: &RiskConfig) -> Option<RiskAction> {
    if aggregate >= risk.small_profit_usd {
        return Some(RiskAction::TakeProfit {
            profit: aggregate,
            threshold: risk.small_profit_usd,
        });
    }

    let threshold = max_loss_threshold(equity.unwrap_or(FALLBACK_EQUITY), risk.max_loss_percent);
    if aggregate <= threshold {
        return Some(RiskAction::CircuitBreaker {
            profit: aggregate,
            threshold,
            percent: risk.max_loss_percent,
        });
    }

    None
}

/// Daily figures relative to the session's starting balance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DailyMetrics {
    pub start_balance: Decimal,
    pub equity: Decimal,
    /// Sum of losing positions' profit (zero or negative).
    pub floating_loss: Decimal,
    /// Equity minus starting balance.
    pub daily_pnl: Decimal,
    pub loss_pct: Decimal,
    pub profit_pct: Decimal,
}

impl DailyMetrics {
    pub fn compute(start_balance: Decimal, equity: Decimal, positions: &[Position]) -> Self {
        let floating_loss = floating_loss(positions);
        let daily_pnl = equity - start_balance;
        let base = if start_balance > Decimal::ZERO {
            start_balance
        } else {
            Decimal::ONE
        };

        Self {
            start_balance,
            equity,
            floating_loss,
            daily_pnl,
            loss_pct: floating_loss.abs() / base * HUNDRED,
            profit_pct: daily_pnl / base * HUNDRED,
        }
    }

    /// Equity at or below 95% of the starting balance.
    pub fn hard_floor_hit(&self) -> bool {
        self.equity <= self.start_balance * HARD_FLOOR_RATIO
    }
}

/// Outcome of the daily-limit check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DailyVerdict {
    Hold,
    LossBreach { loss_pct: Decimal, hard_floor: bool },
    ProfitLock { profit_pct: Decimal },
}

impl DailyVerdict {
    pub fn reason(&self) -> Option<TripReason> {
        match self {
            Self::Hold => None,
            Self::LossBreach { hard_floor: true, .. } => Some(TripReason::HardFloor),
            Self::LossBreach { .. } => Some(TripReason::DailyLossLimit),
            Self::ProfitLock { .. } => Some(TripReason::DailyProfitTarget),
        }
    }
}

/// Apply the daily loss limit, the hard floor and the profit target.
///
/// The loss side is checked first. The hard floor applies whatever the
/// configured percentage.
pub fn evaluate_daily_limits(metrics: &DailyMetrics, risk: &RiskConfig) -> DailyVerdict {
    let hard_floor = metrics.hard_floor_hit();
    if hard_floor || metrics.loss_pct >= risk.daily_loss_limit_pct {
        return DailyVerdict::LossBreach {
            loss_pct: metrics.loss_pct,
            hard_floor,
        };
    }

    if metrics.profit_pct >= risk.daily_profit_target_pct {
        return DailyVerdict::ProfitLock {
            profit_pct: metrics.profit_pct,
        };
    }

    DailyVerdict::Hold
}
