//! Backend capabilities model

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tether_api::SharingMode;

/// Describes what a share backend can do
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendCapabilities {
    /// Platform label reported in session snapshots
    pub platform: String,

    /// Sharing modes this backend can apply
    pub modes: HashSet<SharingMode>,

    /// Can run helper daemons (hostapd, dnsmasq)
    pub can_run_helpers: bool,
}

impl BackendCapabilities {
    /// Every mode supported, no helper daemons
    pub fn all_modes(platform: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            modes: SharingMode::ALL.into_iter().collect(),
            can_run_helpers: false,
        }
    }

    /// Capabilities of the Linux command-based backend
    pub fn linux() -> Self {
        Self {
            can_run_helpers: true,
            ..Self::all_modes("linux")
        }
    }

    pub fn with_modes(mut self, modes: impl IntoIterator<Item = SharingMode>) -> Self {
        self.modes = modes.into_iter().collect();
        self
    }

    pub fn supports_mode(&self, mode: SharingMode) -> bool {
        self.modes.contains(&mode)
    }
}
