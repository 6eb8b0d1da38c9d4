//! Time utilities for tetherd
//!
//! Wall-clock timestamps are used for display and the audit log. Uptime is
//! measured on the monotonic clock so it is immune to wall-clock changes.

use chrono::{DateTime, Local};
use std::time::{Duration, Instant};

/// Current local wall-clock time.
pub fn now() -> DateTime<Local> {
    Local::now()
}

/// Render an uptime in seconds as `1h 02m 03s`, `4m 05s` or `6s`.
pub fn format_uptime(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {:02}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// A point in monotonic time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MonotonicInstant(Instant);

impl MonotonicInstant {
    pub fn now() -> Self {
        Self(Instant::now())
    }

    /// Time since `earlier`, zero if `earlier` is in the future
    pub fn duration_since(&self, earlier: MonotonicInstant) -> Duration {
        self.0.saturating_duration_since(earlier.0)
    }
}

impl std::ops::Add<Duration> for MonotonicInstant {
    type Output = MonotonicInstant;

    fn add(self, rhs: Duration) -> Self::Output {
        MonotonicInstant(self.0 + rhs)
    }
}
