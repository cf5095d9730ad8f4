//! Trading Engine
//!
//! Indicator computation, the volatility filter, lot sizing, order execution
//! and the signal scanner entry loop.

pub mod executor;
pub mod indicators;
pub mod lot_sizing;
pub mod scanner;
pub mod volatility;

pub use executor::{ExecutionMetrics, OrderExecutor};
pub use indicators::IndicatorFrame;
pub use lot_sizing::calculate_lot;
pub use scanner::{CycleOutcome, ScanOutcome, SignalScanner};
pub use volatility::{RejectReason, VolatilityVerdict};
