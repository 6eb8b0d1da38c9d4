//! Validated settings structures

use crate::schema::{
    RawConfig, RawDaemonConfig, RawLimitsConfig, RawLinuxConfig, RawSessionConfig,
};
use std::path::PathBuf;
use std::time::Duration;
use tether_util::Ipv4Cidr;

pub const DEFAULT_BACKEND_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_OBSERVER_BUFFER: usize = 16;
pub const DEFAULT_REQUESTS_PER_MINUTE: usize = 60;

pub const DEFAULT_BRIDGE_NAME: &str = "br-tether";
pub const DEFAULT_SSID: &str = "tether";
pub const DEFAULT_CHANNEL: u32 = 6;
pub const DEFAULT_IP_RANGE: &str = "192.168.137.0/24";
pub const DEFAULT_DHCP_FIRST_HOST: u32 = 100;
pub const DEFAULT_DHCP_LAST_HOST: u32 = 200;
pub const DEFAULT_DHCP_LEASE: &str = "12h";
pub const DEFAULT_DNS_SERVERS: [&str; 2] = ["8.8.8.8", "8.8.4.4"];

/// Validated settings ready for use by the daemon
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub daemon: DaemonSettings,
    pub session: SessionSettings,
    pub limits: LimitSettings,
    pub linux: LinuxSettings,
}

impl Settings {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            daemon: DaemonSettings::from_raw(raw.daemon),
            session: SessionSettings::from_raw(raw.session),
            limits: LimitSettings::from_raw(raw.limits),
            linux: LinuxSettings::from_raw(raw.linux),
        }
    }
}

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct DaemonSettings {
    pub socket_path: PathBuf,
    pub data_dir: PathBuf,
    pub platform: Option<String>,
}

impl DaemonSettings {
    fn from_raw(raw: RawDaemonConfig) -> Self {
        Self {
            socket_path: raw
                .socket_path
                .unwrap_or_else(tether_util::default_socket_path),
            data_dir: raw.data_dir.unwrap_or_else(tether_util::default_data_dir),
            platform: raw.platform,
        }
    }
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self::from_raw(RawDaemonConfig::default())
    }
}

/// Session engine tuning
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// None means no timeout
    pub apply_timeout: Option<Duration>,
    /// None means no timeout
    pub revert_timeout: Option<Duration>,
    pub observer_buffer: usize,
}

impl SessionSettings {
    fn from_raw(raw: RawSessionConfig) -> Self {
        Self {
            apply_timeout: timeout_from_seconds(raw.apply_timeout_seconds),
            revert_timeout: timeout_from_seconds(raw.revert_timeout_seconds),
            observer_buffer: raw.observer_buffer.unwrap_or(DEFAULT_OBSERVER_BUFFER),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_raw(RawSessionConfig::default())
    }
}

// 0 disables, absent means the default
fn timeout_from_seconds(secs: Option<u64>) -> Option<Duration> {
    match secs {
        None => Some(DEFAULT_BACKEND_TIMEOUT),
        Some(0) => None,
        Some(s) => Some(Duration::from_secs(s)),
    }
}

#[derive(Debug, Clone)]
pub struct LimitSettings {
    pub requests_per_minute: usize,
}

impl LimitSettings {
    fn from_raw(raw: RawLimitsConfig) -> Self {
        Self {
            requests_per_minute: raw
                .requests_per_minute
                .unwrap_or(DEFAULT_REQUESTS_PER_MINUTE),
        }
    }
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self::from_raw(RawLimitsConfig::default())
    }
}

/// Settings for the Linux command-based backend
#[derive(Debug, Clone)]
pub struct LinuxSettings {
    pub bridge_name: String,
    pub default_ssid: String,
    pub default_channel: u32,
    pub default_ip_range: Ipv4Cidr,
    pub dhcp_first_host: u32,
    pub dhcp_last_host: u32,
    pub dhcp_lease: String,
    pub dns_servers: Vec<String>,
    pub hostapd_driver: String,
    pub tools: ToolPaths,
    pub runtime_dir: PathBuf,
}

/// Executables the Linux backend invokes
#[derive(Debug, Clone)]
pub struct ToolPaths {
    pub ip: PathBuf,
    pub sysctl: PathBuf,
    pub iptables: PathBuf,
    pub hostapd: PathBuf,
    pub dnsmasq: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            ip: PathBuf::from("ip"),
            sysctl: PathBuf::from("sysctl"),
            iptables: PathBuf::from("iptables"),
            hostapd: PathBuf::from("hostapd"),
            dnsmasq: PathBuf::from("dnsmasq"),
        }
    }
}

fn default_ip_range() -> Ipv4Cidr {
    DEFAULT_IP_RANGE
        .parse()
        .unwrap_or_else(|_| unreachable!("default ip range is valid"))
}

impl LinuxSettings {
    fn from_raw(raw: RawLinuxConfig) -> Self {
        let tools = ToolPaths::default();

        Self {
            bridge_name: raw
                .bridge_name
                .unwrap_or_else(|| DEFAULT_BRIDGE_NAME.to_string()),
            default_ssid: raw.default_ssid.unwrap_or_else(|| DEFAULT_SSID.to_string()),
            default_channel: raw.default_channel.unwrap_or(DEFAULT_CHANNEL),
            // Validation has already rejected unparsable ranges
            default_ip_range: raw
                .default_ip_range
                .and_then(|r| r.parse().ok())
                .unwrap_or_else(default_ip_range),
            dhcp_first_host: raw.dhcp_first_host.unwrap_or(DEFAULT_DHCP_FIRST_HOST),
            dhcp_last_host: raw.dhcp_last_host.unwrap_or(DEFAULT_DHCP_LAST_HOST),
            dhcp_lease: raw
                .dhcp_lease
                .unwrap_or_else(|| DEFAULT_DHCP_LEASE.to_string()),
            dns_servers: raw.dns_servers.unwrap_or_else(|| {
                DEFAULT_DNS_SERVERS.iter().map(|s| s.to_string()).collect()
            }),
            hostapd_driver: raw.hostapd_driver.unwrap_or_else(|| "nl80211".to_string()),
            tools: ToolPaths {
                ip: raw.ip_path.unwrap_or(tools.ip),
                sysctl: raw.sysctl_path.unwrap_or(tools.sysctl),
                iptables: raw.iptables_path.unwrap_or(tools.iptables),
                hostapd: raw.hostapd_path.unwrap_or(tools.hostapd),
                dnsmasq: raw.dnsmasq_path.unwrap_or(tools.dnsmasq),
            },
            runtime_dir: raw
                .runtime_dir
                .unwrap_or_else(tether_util::default_runtime_dir),
        }
    }
}

impl Default for LinuxSettings {
    fn default() -> Self {
        Self::from_raw(RawLinuxConfig::default())
    }
}
