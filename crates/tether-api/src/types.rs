//! Shared types for the tetherd protocol

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use tether_util::SessionId;

/// Broad class of a network interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceKind {
    Wired,
    Wireless,
    Virtual,
    Unknown,
}

impl fmt::Display for InterfaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InterfaceKind::Wired => "wired",
            InterfaceKind::Wireless => "wireless",
            InterfaceKind::Virtual => "virtual",
            InterfaceKind::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// A network interface as seen by the host at query time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: InterfaceKind,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub mac: Option<String>,
    /// Operational state (link up)
    #[serde(default)]
    pub up: bool,
}

impl Interface {
    pub fn new(name: impl Into<String>, kind: InterfaceKind) -> Self {
        Self {
            name: name.into(),
            kind,
            ip: None,
            mac: None,
            up: false,
        }
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    pub fn with_mac(mut self, mac: impl Into<String>) -> Self {
        self.mac = Some(mac.into());
        self
    }

    pub fn with_up(mut self, up: bool) -> Self {
        self.up = up;
        self
    }
}

/// How the target interface is given access to the source's network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SharingMode {
    /// Layer-2 bridge between source and target
    Bridge,
    /// Wireless access point on the target, NATed to the source
    Hotspot,
    /// Routed NAT with DHCP on the target
    Nat,
}

impl SharingMode {
    pub const ALL: [SharingMode; 3] = [SharingMode::Bridge, SharingMode::Hotspot, SharingMode::Nat];

    pub fn as_str(&self) -> &'static str {
        match self {
            SharingMode::Bridge => "bridge",
            SharingMode::Hotspot => "hotspot",
            SharingMode::Nat => "nat",
        }
    }
}

impl fmt::Display for SharingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SharingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bridge" => Ok(SharingMode::Bridge),
            "hotspot" => Ok(SharingMode::Hotspot),
            "nat" => Ok(SharingMode::Nat),
            other => Err(format!("unknown sharing mode '{}'", other)),
        }
    }
}

/// Shortest accepted hotspot passphrase (WPA2-PSK)
pub const MIN_PASSWORD_LEN: usize = 8;

/// Longest accepted hotspot passphrase (WPA2-PSK)
pub const MAX_PASSWORD_LEN: usize = 63;

/// Longest SSID in bytes (802.11)
pub const MAX_SSID_LEN: usize = 32;

/// 2.4 GHz channels 1-14 and the 5 GHz channel block 32-177
pub fn is_valid_wifi_channel(channel: u32) -> bool {
    (1..=14).contains(&channel) || (32..=177).contains(&channel)
}

/// Requested sharing setup.
///
/// `source` consumes internet, `target` distributes it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharingConfig {
    pub mode: SharingMode,
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_range: Option<String>,
}

impl SharingConfig {
    pub fn new(mode: SharingMode, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            mode,
            source: source.into(),
            target: target.into(),
            ssid: None,
            password: None,
            channel: None,
            ip_range: None,
        }
    }

    pub fn with_ssid(mut self, ssid: impl Into<String>) -> Self {
        self.ssid = Some(ssid.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_channel(mut self, channel: u32) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn with_ip_range(mut self, ip_range: impl Into<String>) -> Self {
        self.ip_range = Some(ip_range.into());
        self
    }

    /// Password if one is set and non-empty
    pub fn effective_password(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }
}

// Keeps the passphrase out of logs.
impl fmt::Debug for SharingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharingConfig")
            .field("mode", &self.mode)
            .field("source", &self.source)
            .field("target", &self.target)
            .field("ssid", &self.ssid)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("channel", &self.channel)
            .field("ip_range", &self.ip_range)
            .finish()
    }
}

/// Lifecycle phase of the sharing session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Inactive,
    Starting,
    Active,
    Stopping,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionPhase::Inactive => "inactive",
            SessionPhase::Starting => "starting",
            SessionPhase::Active => "active",
            SessionPhase::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

/// Point-in-time view of the sharing session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub active: bool,
    pub phase: SessionPhase,
    pub platform: String,
    pub mode: Option<SharingMode>,
    pub source_interface: Option<String>,
    pub target_interface: Option<String>,
    pub session_id: Option<SessionId>,
    pub started_at: Option<DateTime<Local>>,
    /// Seconds since the session became active; 0 when inactive
    pub uptime: u64,
}

impl SessionSnapshot {
    pub fn inactive(platform: impl Into<String>) -> Self {
        Self {
            active: false,
            phase: SessionPhase::Inactive,
            platform: platform.into(),
            mode: None,
            source_interface: None,
            target_interface: None,
            session_id: None,
            started_at: None,
            uptime: 0,
        }
    }

    /// Same session shape, ignoring uptime and phase-only changes
    pub fn same_endpoints(&self, other: &SessionSnapshot) -> bool {
        self.active == other.active
            && self.mode == other.mode
            && self.source_interface == other.source_interface
            && self.target_interface == other.target_interface
    }
}

/// Client role for authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientRole {
    /// Local administrator - may start and stop sharing and edit profiles
    Admin,
    /// Read-only observer
    Observer,
}

impl ClientRole {
    pub fn can_control_sharing(&self) -> bool {
        matches!(self, ClientRole::Admin)
    }

    pub fn can_edit_profiles(&self) -> bool {
        matches!(self, ClientRole::Admin)
    }
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub live: bool,
    pub ready: bool,
    pub backend_ok: bool,
    pub store_ok: bool,
    pub inventory_ok: bool,
    pub observers: usize,
    /// Why the backend is not ready, if it isn't
    #[serde(default)]
    pub backend_issues: Vec<String>,
}
