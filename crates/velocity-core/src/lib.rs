//! Velocity Core Library
//!
//! Shared types, configuration, and the gateway/store contracts used by the
//! signal scanner, the risk monitor and the account monitor.

pub mod config;
pub mod error;
pub mod gateway;
pub mod store;
pub mod types;
pub mod worker;

pub use config::{AppConfig, BotConfig, BotConfigUpdate, ConfigCache, RiskConfig, StrategyConfig, VolatilityConfig};
pub use error::{Error, GatewayError, Result};
pub use gateway::{PaperGateway, SerializedGateway, TradingGateway};
pub use store::{ConfigStore, MemoryStore};
pub use worker::Worker;
