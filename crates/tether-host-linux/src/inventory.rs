//! Interface inventory from sysfs

use std::collections::HashMap;
use std::fs;
use std::net::SocketAddrV4;
use std::path::{Path, PathBuf};
use tether_api::{Interface, InterfaceKind};
use tether_host_api::{InterfaceInventory, InventoryError, InventoryResult};
use tracing::{debug, warn};

pub const SYSFS_NET_ROOT: &str = "/sys/class/net";

/// ARPHRD_ETHER from `<linux/if_arp.h>`
const ARPHRD_ETHER: &str = "1";

const VIRTUAL_PREFIXES: &[&str] = &[
    "br", "veth", "tun", "tap", "docker", "virbr", "bond", "vlan", "vnet", "wg",
];

/// Lists network interfaces from `/sys/class/net`
pub struct SysfsInventory {
    root: PathBuf,
    query_addresses: bool,
}

impl SysfsInventory {
    pub fn new() -> Self {
        Self {
            root: PathBuf::from(SYSFS_NET_ROOT),
            query_addresses: true,
        }
    }

    /// Read interfaces from another directory. Addresses are not queried
    /// since they would come from the live host.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            query_addresses: false,
        }
    }
}

impl Default for SysfsInventory {
    fn default() -> Self {
        Self::new()
    }
}

impl InterfaceInventory for SysfsInventory {
    fn list(&self) -> InventoryResult<Vec<Interface>> {
        let entries = fs::read_dir(&self.root).map_err(|e| {
            InventoryError::Unavailable(format!("{}: {}", self.root.display(), e))
        })?;

        let addresses = if self.query_addresses {
            ipv4_addresses()
        } else {
            HashMap::new()
        };

        let mut interfaces = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == "lo" {
                continue;
            }

            let dir = entry.path();
            let mut iface = Interface::new(name.as_str(), classify(&dir, &name))
                .with_up(read_attr(&dir, "operstate").as_deref() == Some("up"));
            if let Some(mac) = read_attr(&dir, "address").filter(|m| !is_null_mac(m)) {
                iface = iface.with_mac(mac);
            }
            if let Some(ip) = addresses.get(&name) {
                iface = iface.with_ip(ip.as_str());
            }
            interfaces.push(iface);
        }

        interfaces.sort_by(|a, b| a.name.cmp(&b.name));
        debug!(count = interfaces.len(), "Listed interfaces");
        Ok(interfaces)
    }
}

fn read_attr(dir: &Path, attr: &str) -> Option<String> {
    fs::read_to_string(dir.join(attr))
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn is_null_mac(mac: &str) -> bool {
    mac.split(':').all(|octet| octet == "00")
}

fn classify(dir: &Path, name: &str) -> InterfaceKind {
    let uevent = read_attr(dir, "uevent").unwrap_or_default();
    if dir.join("wireless").exists() || uevent.lines().any(|l| l == "DEVTYPE=wlan") {
        return InterfaceKind::Wireless;
    }

    if VIRTUAL_PREFIXES.iter().any(|p| name.starts_with(p)) || !dir.join("device").exists() {
        return InterfaceKind::Virtual;
    }

    match read_attr(dir, "type").as_deref() {
        Some(ARPHRD_ETHER) => InterfaceKind::Wired,
        _ => InterfaceKind::Unknown,
    }
}

/// First IPv4 address of each interface
fn ipv4_addresses() -> HashMap<String, String> {
    let mut addresses = HashMap::new();

    let ifaddrs = match nix::ifaddrs::getifaddrs() {
        Ok(ifaddrs) => ifaddrs,
        Err(e) => {
            warn!(error = %e, "getifaddrs failed, interfaces will have no addresses");
            return addresses;
        }
    };

    for ifaddr in ifaddrs {
        let Some(sin) = ifaddr.address.as_ref().and_then(|a| a.as_sockaddr_in()) else {
            continue;
        };
        let ip = SocketAddrV4::from(*sin).ip().to_string();
        addresses.entry(ifaddr.interface_name).or_insert(ip);
    }

    addresses
}
