//! Velocity Bot
//!
//! Supervisor wiring the signal scanner, risk monitor and account monitor to
//! one serialized gateway, plus the random-walk feed used in paper mode.

pub mod feed;
pub mod supervisor;

pub use feed::RandomWalkFeed;
pub use supervisor::{Supervisor, SupervisorOptions, SupervisorStatus};
