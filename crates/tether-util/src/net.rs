//! IPv4 network ranges used for NAT and hotspot addressing

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use thiserror::Error;

/// Smallest prefix accepted for a shared network
pub const MIN_SHARED_PREFIX: u8 = 8;

/// Largest prefix that still leaves room for a gateway and one client
pub const MAX_SHARED_PREFIX: u8 = 30;

/// An IPv4 network in CIDR notation, normalized to its network address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4Cidr {
    network: Ipv4Addr,
    prefix: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct CidrParseError(String);

impl Ipv4Cidr {
    pub fn new(addr: Ipv4Addr, prefix: u8) -> Result<Self, CidrParseError> {
        if prefix > 32 {
            return Err(CidrParseError(format!("prefix /{} is out of range", prefix)));
        }
        let network = Ipv4Addr::from(u32::from(addr) & Self::mask_bits(prefix));
        Ok(Self { network, prefix })
    }

    fn mask_bits(prefix: u8) -> u32 {
        if prefix == 0 {
            0
        } else {
            u32::MAX << (32 - prefix as u32)
        }
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    pub fn netmask(&self) -> Ipv4Addr {
        Ipv4Addr::from(Self::mask_bits(self.prefix))
    }

    pub fn broadcast(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.network) | !Self::mask_bits(self.prefix))
    }

    /// Number of usable host addresses (network and broadcast excluded)
    pub fn host_count(&self) -> u32 {
        match self.prefix {
            32 => 1,
            31 => 2,
            p => ((1u64 << (32 - p as u32)) - 2) as u32,
        }
    }

    /// The `n`th host address, 1-based, if it lies inside the range
    pub fn host(&self, n: u32) -> Option<Ipv4Addr> {
        if n == 0 || n > self.host_count() {
            return None;
        }
        Some(Ipv4Addr::from(u32::from(self.network) + n))
    }

    /// First host, used as the gateway on the target interface
    pub fn gateway(&self) -> Option<Ipv4Addr> {
        self.host(1)
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & Self::mask_bits(self.prefix) == u32::from(self.network)
    }

    /// Whether the range is a sensible size for a shared network
    pub fn is_shareable(&self) -> bool {
        (MIN_SHARED_PREFIX..=MAX_SHARED_PREFIX).contains(&self.prefix)
    }
}

impl FromStr for Ipv4Cidr {
    type Err = CidrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| CidrParseError(format!("'{}' is not in address/prefix form", s)))?;

        let addr: Ipv4Addr = addr
            .parse()
            .map_err(|_| CidrParseError(format!("'{}' is not an IPv4 address", addr)))?;
        let prefix: u8 = prefix
            .parse()
            .map_err(|_| CidrParseError(format!("'{}' is not a prefix length", prefix)))?;

        Self::new(addr, prefix)
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_default_sharing_range() {
        let cidr: Ipv4Cidr = "192.168.137.0/24".parse().unwrap();

        assert_eq!(cidr.network(), Ipv4Addr::new(192, 168, 137, 0));
        assert_eq!(cidr.gateway(), Some(Ipv4Addr::new(192, 168, 137, 1)));
        assert_eq!(cidr.host(100), Some(Ipv4Addr::new(192, 168, 137, 100)));
        assert_eq!(cidr.broadcast(), Ipv4Addr::new(192, 168, 137, 255));
        assert_eq!(cidr.netmask(), Ipv4Addr::new(255, 255, 255, 0));
        assert_eq!(cidr.host_count(), 254);
        assert!(cidr.is_shareable());
    }

    #[test]
    fn normalizes_host_bits() {
        let cidr: Ipv4Cidr = "10.0.0.77/24".parse().unwrap();
        assert_eq!(cidr.to_string(), "10.0.0.0/24");
        assert!(cidr.contains(Ipv4Addr::new(10, 0, 0, 200)));
        assert!(!cidr.contains(Ipv4Addr::new(10, 0, 1, 1)));
    }

    #[test]
    fn host_out_of_range() {
        let cidr: Ipv4Cidr = "10.0.0.0/30".parse().unwrap();
        assert_eq!(cidr.host_count(), 2);
        assert!(cidr.host(2).is_some());
        assert!(cidr.host(3).is_none());
        assert!(cidr.host(0).is_none());
    }

    #[test]
    fn rejects_garbage() {
        assert!("10.0.0.0".parse::<Ipv4Cidr>().is_err());
        assert!("10.0.0/24".parse::<Ipv4Cidr>().is_err());
        assert!("10.0.0.0/33".parse::<Ipv4Cidr>().is_err());
        assert!("fe80::/64".parse::<Ipv4Cidr>().is_err());
    }

    #[test]
    fn shareable_prefixes() {
        assert!(!"10.0.0.0/31".parse::<Ipv4Cidr>().unwrap().is_shareable());
        assert!(!"10.0.0.0/7".parse::<Ipv4Cidr>().unwrap().is_shareable());
        assert!("10.0.0.0/8".parse::<Ipv4Cidr>().unwrap().is_shareable());
    }
}
