//! Sharing config validation

use std::fmt;
use tether_api::{
    Interface, MAX_PASSWORD_LEN, MAX_SSID_LEN, MIN_PASSWORD_LEN, SharingConfig, SharingMode,
    is_valid_wifi_channel,
};
use tether_host_api::BackendCapabilities;
use tether_util::Ipv4Cidr;

/// Which end of the share an interface name refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Source,
    Target,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Source => f.write_str("source"),
            Endpoint::Target => f.write_str("target"),
        }
    }
}

/// One reason a sharing config was rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationIssue {
    #[error("{0} interface name is empty")]
    EmptyInterface(Endpoint),

    #[error("source and target are both '{0}'")]
    SameInterface(String),

    #[error("{endpoint} interface '{name}' not found")]
    UnknownInterface { endpoint: Endpoint, name: String },

    #[error("mode '{0}' is not supported on this host")]
    UnsupportedMode(SharingMode),

    #[error("password must be at least 8 characters (got {0})")]
    PasswordTooShort(usize),

    #[error("password must be at most 63 characters (got {0})")]
    PasswordTooLong(usize),

    #[error("password may only contain printable ASCII characters")]
    PasswordNotPrintable,

    #[error("ssid must be at most 32 bytes (got {0})")]
    SsidTooLong(usize),

    #[error("ssid must not contain control characters")]
    SsidControlCharacter,

    #[error("channel {0} is not a valid Wi-Fi channel")]
    InvalidChannel(u32),

    #[error("ip_range '{value}': {reason}")]
    InvalidIpRange { value: String, reason: String },
}

/// Check a config against the current interfaces and backend.
///
/// Every problem found is returned; an empty list means the config may be
/// applied.
pub fn validate_sharing_config(
    config: &SharingConfig,
    interfaces: &[Interface],
    capabilities: &BackendCapabilities,
) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    for (endpoint, name) in [
        (Endpoint::Source, &config.source),
        (Endpoint::Target, &config.target),
    ] {
        if name.trim().is_empty() {
            issues.push(ValidationIssue::EmptyInterface(endpoint));
        } else if !interfaces.iter().any(|i| &i.name == name) {
            issues.push(ValidationIssue::UnknownInterface {
                endpoint,
                name: name.clone(),
            });
        }
    }

    if !config.source.is_empty() && config.source == config.target {
        issues.push(ValidationIssue::SameInterface(config.source.clone()));
    }

    if !capabilities.supports_mode(config.mode) {
        issues.push(ValidationIssue::UnsupportedMode(config.mode));
    }

    if config.mode == SharingMode::Hotspot {
        issues.extend(validate_hotspot(config));
    }

    if let Some(range) = &config.ip_range {
        match range.parse::<Ipv4Cidr>() {
            Ok(cidr) if cidr.is_shareable() => {}
            Ok(cidr) => issues.push(ValidationIssue::InvalidIpRange {
                value: range.clone(),
                reason: format!("prefix /{} must be between /8 and /30", cidr.prefix()),
            }),
            Err(e) => issues.push(ValidationIssue::InvalidIpRange {
                value: range.clone(),
                reason: e.to_string(),
            }),
        }
    }

    issues
}

fn validate_hotspot(config: &SharingConfig) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    // An empty password means an open network. WPA passphrases are
    // 8-63 printable ASCII characters.
    if let Some(password) = config.effective_password() {
        if !password.bytes().all(is_printable_ascii) {
            issues.push(ValidationIssue::PasswordNotPrintable);
        } else if password.len() < MIN_PASSWORD_LEN {
            issues.push(ValidationIssue::PasswordTooShort(password.len()));
        } else if password.len() > MAX_PASSWORD_LEN {
            issues.push(ValidationIssue::PasswordTooLong(password.len()));
        }
    }

    if let Some(ssid) = &config.ssid {
        if ssid.len() > MAX_SSID_LEN {
            issues.push(ValidationIssue::SsidTooLong(ssid.len()));
        }
        if ssid.chars().any(char::is_control) {
            issues.push(ValidationIssue::SsidControlCharacter);
        }
    }

    if let Some(channel) = config.channel {
        if !is_valid_wifi_channel(channel) {
            issues.push(ValidationIssue::InvalidChannel(channel));
        }
    }

    issues
}

fn is_printable_ascii(b: u8) -> bool {
    (0x20..=0x7e).contains(&b)
}
