//! Config validation CLI tool
//!
//! Validates a tetherd configuration file and reports any errors.

use std::path::PathBuf;
use std::process::ExitCode;
use tether_util::default_config_path;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a tetherd configuration file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            eprintln!();
            eprintln!("Example:");
            eprintln!("  validate-config {}", default_path.display());
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match tether_config::load_config(&config_path) {
        Ok(settings) => {
            let timeout = |t: Option<std::time::Duration>| match t {
                Some(d) => format!("{}s", d.as_secs()),
                None => "disabled".to_string(),
            };

            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", tether_config::CURRENT_CONFIG_VERSION);
            println!("  Socket: {}", settings.daemon.socket_path.display());
            println!("  Data dir: {}", settings.daemon.data_dir.display());
            println!("  Apply timeout: {}", timeout(settings.session.apply_timeout));
            println!("  Revert timeout: {}", timeout(settings.session.revert_timeout));
            println!("  Observer buffer: {}", settings.session.observer_buffer);
            println!("  Requests/minute: {}", settings.limits.requests_per_minute);
            println!();
            println!("Linux backend:");
            println!("  Bridge: {}", settings.linux.bridge_name);
            println!(
                "  Hotspot defaults: ssid '{}', channel {}",
                settings.linux.default_ssid, settings.linux.default_channel
            );
            println!(
                "  Shared range: {} (DHCP hosts {}-{}, lease {})",
                settings.linux.default_ip_range,
                settings.linux.dhcp_first_host,
                settings.linux.dhcp_last_host,
                settings.linux.dhcp_lease
            );
            println!("  Runtime dir: {}", settings.linux.runtime_dir.display());

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                tether_config::ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                tether_config::ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                tether_config::ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                tether_config::ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        tether_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
