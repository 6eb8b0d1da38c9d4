//! Configuration parsing and validation for tetherd
//!
//! Supports TOML configuration with:
//! - Versioned schema
//! - Daemon paths, session timeouts and observer buffering
//! - Per-client request limits
//! - Linux backend defaults (bridge name, hotspot, DHCP, tool paths)
//! - Validation with clear error messages

mod schema;
mod settings;
mod validation;

pub use schema::*;
pub use settings::*;
pub use validation::*;

use std::path::Path;
use thiserror::Error;
use tracing::info;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation failed: {errors:?}")]
    ValidationFailed { errors: Vec<ValidationError> },

    #[error("Unsupported config version: {0}")]
    UnsupportedVersion(u32),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Load and validate configuration from a TOML file
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<Settings> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Like [`load_config`], but a missing file yields the defaults
pub fn load_config_or_default(path: impl AsRef<Path>) -> ConfigResult<Settings> {
    let path = path.as_ref();
    if !path.exists() {
        info!(path = %path.display(), "No config file, using defaults");
        return Ok(Settings::default());
    }
    load_config(path)
}

/// Parse and validate configuration from a TOML string
pub fn parse_config(content: &str) -> ConfigResult<Settings> {
    let raw: RawConfig = toml::from_str(content)?;

    if raw.config_version != CURRENT_CONFIG_VERSION {
        return Err(ConfigError::UnsupportedVersion(raw.config_version));
    }

    let errors = validate_config(&raw);
    if !errors.is_empty() {
        return Err(ConfigError::ValidationFailed { errors });
    }

    Ok(Settings::from_raw(raw))
}

/// Current supported config version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn parse_minimal_config() {
        let settings = parse_config("config_version = 1").unwrap();

        assert_eq!(settings.session.apply_timeout, Some(DEFAULT_BACKEND_TIMEOUT));
        assert_eq!(settings.session.observer_buffer, DEFAULT_OBSERVER_BUFFER);
        assert_eq!(settings.limits.requests_per_minute, 60);
        assert_eq!(settings.linux.bridge_name, DEFAULT_BRIDGE_NAME);
    }

    #[test]
    fn parse_full_config() {
        let config = r#"
            config_version = 1

            [daemon]
            socket_path = "/run/tether/tetherd.sock"
            data_dir = "/var/lib/tether"
            platform = "linux-lab"

            [session]
            apply_timeout_seconds = 10
            revert_timeout_seconds = 0
            observer_buffer = 4

            [limits]
            requests_per_minute = 120

            [linux]
            bridge_name = "br-lab"
            default_ssid = "Lab"
            default_channel = 11
            default_ip_range = "10.42.0.0/24"
            dns_servers = ["1.1.1.1"]
            hostapd_path = "/usr/sbin/hostapd"
            runtime_dir = "/run/tether"
        "#;

        let settings = parse_config(config).unwrap();

        assert_eq!(settings.daemon.socket_path, PathBuf::from("/run/tether/tetherd.sock"));
        assert_eq!(settings.daemon.platform.as_deref(), Some("linux-lab"));
        assert_eq!(settings.session.apply_timeout, Some(Duration::from_secs(10)));
        assert_eq!(settings.session.revert_timeout, None);
        assert_eq!(settings.session.observer_buffer, 4);
        assert_eq!(settings.limits.requests_per_minute, 120);
        assert_eq!(settings.linux.bridge_name, "br-lab");
        assert_eq!(settings.linux.default_channel, 11);
        assert_eq!(settings.linux.default_ip_range.to_string(), "10.42.0.0/24");
        assert_eq!(settings.linux.dns_servers, vec!["1.1.1.1"]);
        assert_eq!(settings.linux.tools.hostapd, PathBuf::from("/usr/sbin/hostapd"));
        assert_eq!(settings.linux.tools.dnsmasq, PathBuf::from("dnsmasq"));
        assert_eq!(settings.linux.runtime_dir, PathBuf::from("/run/tether"));
    }

    #[test]
    fn reject_wrong_version() {
        let result = parse_config("config_version = 99");
        assert!(matches!(result, Err(ConfigError::UnsupportedVersion(99))));
    }

    #[test]
    fn reject_invalid_values() {
        let result = parse_config(
            r#"
            config_version = 1
            [linux]
            default_channel = 200
            "#,
        );
        assert!(matches!(result, Err(ConfigError::ValidationFailed { .. })));
    }

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_config_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings.linux.default_ssid, DEFAULT_SSID);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "config_version = 1\n[limits]\nrequests_per_minute = 5\n").unwrap();

        let settings = load_config(&path).unwrap();
        assert_eq!(settings.limits.requests_per_minute, 5);
    }
}
