//! tetherd service internals
//!
//! Request dispatch lives here so it can be exercised without the binary's
//! signal handling and host wiring.

mod handler;

pub use handler::*;
