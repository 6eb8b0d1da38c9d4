//! Linux backend for tetherd
//!
//! Provides:
//! - Command plans for bridge, NAT and hotspot sharing built on `ip`,
//!   `sysctl` and `iptables`
//! - Rollback of partially applied plans
//! - hostapd/dnsmasq helpers in their own process groups
//! - Interface inventory from sysfs and getifaddrs
//! - Readiness checks for tools and privileges

mod backend;
mod diagnostics;
mod inventory;
mod plan;
mod process;

pub use backend::*;
pub use diagnostics::*;
pub use inventory::*;
pub use plan::*;
pub use process::*;
