//! Core domain types for the Velocity trading bot.

pub mod account;
pub mod market;
pub mod order;
pub mod position;
pub mod status;

pub use account::*;
pub use market::*;
pub use order::*;
pub use position::*;
pub use status::*;
