//! Error types for the Velocity trading bot.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Connectivity error: {message}")]
    Connectivity { message: String },

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failure values returned by a trading gateway.
///
/// Gateways never panic into the engine loops; every failed call comes back
/// as one of these.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("terminal not connected")]
    NotConnected,

    #[error("symbol '{0}' not found")]
    SymbolNotFound(String),

    #[error("position {0} not found")]
    PositionNotFound(u64),

    #[error("max open positions ({0}) reached")]
    MaxPositions(usize),

    #[error("no price available for '{0}'")]
    NoPrice(String),

    #[error("order rejected - retcode {code}: {message}")]
    Rejected { code: u32, message: String },

    #[error("trading halted for the day")]
    TradingHalted,
}
