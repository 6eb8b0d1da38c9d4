//! Configuration validation

use crate::schema::{RawConfig, RawLinuxConfig};
use tether_api::{MAX_SSID_LEN, is_valid_wifi_channel};
use tether_util::Ipv4Cidr;
use thiserror::Error;

/// Linux limits interface names to IFNAMSIZ - 1 bytes
const MAX_IFNAME_LEN: usize = 15;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("[session] {0}")]
    SessionError(String),

    #[error("[limits] {0}")]
    LimitsError(String),

    #[error("[linux] {field}: {message}")]
    LinuxError { field: String, message: String },

    #[error("Global config error: {0}")]
    GlobalError(String),
}

fn linux_error(field: &str, message: impl Into<String>) -> ValidationError {
    ValidationError::LinuxError {
        field: field.to_string(),
        message: message.into(),
    }
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Some(platform) = &config.daemon.platform {
        if platform.trim().is_empty() {
            errors.push(ValidationError::GlobalError(
                "daemon.platform cannot be empty".into(),
            ));
        }
    }

    if config.session.observer_buffer == Some(0) {
        errors.push(ValidationError::SessionError(
            "observer_buffer must be at least 1".into(),
        ));
    }

    if config.limits.requests_per_minute == Some(0) {
        errors.push(ValidationError::LimitsError(
            "requests_per_minute must be at least 1".into(),
        ));
    }

    errors.extend(validate_linux(&config.linux));

    errors
}

fn validate_linux(linux: &RawLinuxConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Some(name) = &linux.bridge_name {
        if name.is_empty() || name.len() > MAX_IFNAME_LEN {
            errors.push(linux_error(
                "bridge_name",
                format!("must be 1-{} bytes", MAX_IFNAME_LEN),
            ));
        } else if name.contains(|c: char| c.is_whitespace() || c == '/') {
            errors.push(linux_error("bridge_name", "must not contain whitespace or '/'"));
        }
    }

    if let Some(ssid) = &linux.default_ssid {
        if ssid.is_empty() || ssid.len() > MAX_SSID_LEN {
            errors.push(linux_error(
                "default_ssid",
                format!("must be 1-{} bytes", MAX_SSID_LEN),
            ));
        }
    }

    if let Some(channel) = linux.default_channel {
        if !is_valid_wifi_channel(channel) {
            errors.push(linux_error(
                "default_channel",
                format!("{} is not a valid Wi-Fi channel", channel),
            ));
        }
    }

    let range = match &linux.default_ip_range {
        Some(raw) => match raw.parse::<Ipv4Cidr>() {
            Ok(range) if range.is_shareable() => Some(range),
            Ok(range) => {
                errors.push(linux_error(
                    "default_ip_range",
                    format!("prefix /{} must be between /8 and /30", range.prefix()),
                ));
                None
            }
            Err(e) => {
                errors.push(linux_error("default_ip_range", e.to_string()));
                None
            }
        },
        None => crate::DEFAULT_IP_RANGE.parse().ok(),
    };

    let first = linux.dhcp_first_host.unwrap_or(crate::DEFAULT_DHCP_FIRST_HOST);
    let last = linux.dhcp_last_host.unwrap_or(crate::DEFAULT_DHCP_LAST_HOST);
    if first < 2 {
        errors.push(linux_error(
            "dhcp_first_host",
            "host 1 is reserved for the gateway",
        ));
    }
    if first > last {
        errors.push(linux_error(
            "dhcp_first_host",
            format!("{} is after dhcp_last_host {}", first, last),
        ));
    }
    if let Some(range) = range {
        if range.host(last).is_none() {
            errors.push(linux_error(
                "dhcp_last_host",
                format!("{} is outside {}", last, range),
            ));
        }
    }

    if let Some(servers) = &linux.dns_servers {
        for server in servers {
            if server.parse::<std::net::IpAddr>().is_err() {
                errors.push(linux_error(
                    "dns_servers",
                    format!("'{}' is not an IP address", server),
                ));
            }
        }
    }

    if let Some(lease) = &linux.dhcp_lease {
        if lease.is_empty() {
            errors.push(linux_error("dhcp_lease", "cannot be empty"));
        }
    }

    errors
}
