//! Shared utilities for tetherd
//!
//! This crate provides:
//! - ID types (ProfileName, SessionId, ClientId)
//! - Time utilities (wall clock, monotonic instants, uptime formatting)
//! - Sliding-window rate limiting
//! - IPv4 CIDR ranges for shared networks
//! - Default paths for socket, config, data, and runtime directories

mod ids;
mod net;
mod paths;
mod rate_limit;
mod time;

pub use ids::*;
pub use net::*;
pub use paths::*;
pub use rate_limit::*;
pub use time::*;
