//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Global daemon settings
    #[serde(default)]
    pub daemon: RawDaemonConfig,

    /// Session engine tuning
    #[serde(default)]
    pub session: RawSessionConfig,

    /// Per-client request limits
    #[serde(default)]
    pub limits: RawLimitsConfig,

    /// Linux backend settings
    #[serde(default)]
    pub linux: RawLinuxConfig,
}

/// Daemon-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawDaemonConfig {
    /// IPC socket path
    pub socket_path: Option<PathBuf>,

    /// Data directory for the profile store
    pub data_dir: Option<PathBuf>,

    /// Platform label reported in snapshots (default: backend's own)
    pub platform: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawSessionConfig {
    /// Seconds allowed for a backend apply; 0 disables the timeout
    pub apply_timeout_seconds: Option<u64>,

    /// Seconds allowed for a backend revert; 0 disables the timeout
    pub revert_timeout_seconds: Option<u64>,

    /// Status snapshots buffered per observer before the oldest are dropped
    pub observer_buffer: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawLimitsConfig {
    pub requests_per_minute: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawLinuxConfig {
    pub bridge_name: Option<String>,
    pub default_ssid: Option<String>,
    pub default_channel: Option<u32>,
    pub default_ip_range: Option<String>,

    /// First DHCP host offset inside the shared range
    pub dhcp_first_host: Option<u32>,
    /// Last DHCP host offset inside the shared range
    pub dhcp_last_host: Option<u32>,
    pub dhcp_lease: Option<String>,
    pub dns_servers: Option<Vec<String>>,

    pub hostapd_driver: Option<String>,

    pub ip_path: Option<PathBuf>,
    pub sysctl_path: Option<PathBuf>,
    pub iptables_path: Option<PathBuf>,
    pub hostapd_path: Option<PathBuf>,
    pub dnsmasq_path: Option<PathBuf>,

    /// Where rendered hostapd/dnsmasq configs are written
    pub runtime_dir: Option<PathBuf>,
}
