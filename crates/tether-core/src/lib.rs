//! Sharing session orchestration for tetherd
//!
//! This crate is the heart of tetherd, containing:
//! - Sharing config validation against the interface inventory
//! - Session state machine (Inactive -> Starting -> Active -> Stopping -> Inactive)
//! - Status broadcasting to a dynamic set of observers
//! - Uptime measured on monotonic time

mod broadcast;
mod engine;
mod error;
mod session;
mod validation;

pub use broadcast::*;
pub use engine::*;
pub use error::*;
pub use session::*;
pub use validation::*;
