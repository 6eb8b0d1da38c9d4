//! Host backend trait interfaces for tetherd
//!
//! This crate defines the interface between the session engine and the
//! platform code that actually reconfigures networking. It contains no
//! platform code itself.

mod capabilities;
mod mock;
mod traits;

pub use capabilities::*;
pub use mock::*;
pub use traits::*;
