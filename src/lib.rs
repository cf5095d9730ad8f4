//! Velocity: automated scalping control loop
//!
//! This is the root crate that provides benchmark and integration-test access
//! to the internal crates. For actual functionality, use them directly:
//!
//! - `velocity-core`: Shared types, configuration, gateway and store contracts
//! - `trading-engine`: Indicators, volatility filter, lot sizing, signal scanner
//! - `risk-manager`: Profit-take and circuit breaker, account monitor, adaptive targets
//! - `velocity-bot`: Supervisor and paper-trading binary

// Re-export for benchmarks
pub use risk_manager as risk;
pub use trading_engine as trading;
pub use velocity_bot as bot;
pub use velocity_core as core;
