//! Default paths for tetherd components
//!
//! Paths follow the XDG base directories so the daemon can run unprivileged
//! in development; packaged installs override them in the config file.
//! - Socket: `$XDG_RUNTIME_DIR/tether/tetherd.sock` or `/tmp/tether-$USER/tetherd.sock`
//! - Config: `$XDG_CONFIG_HOME/tether/config.toml` or `~/.config/tether/config.toml`
//! - Data: `$XDG_DATA_HOME/tether` or `~/.local/share/tether`
//! - Runtime files (rendered hostapd/dnsmasq configs): `<socket dir>/run`

use std::path::PathBuf;

/// Environment variable for overriding the socket path
pub const TETHER_SOCKET_ENV: &str = "TETHER_SOCKET";

/// Environment variable for overriding the data directory
pub const TETHER_DATA_DIR_ENV: &str = "TETHER_DATA_DIR";

const SOCKET_FILENAME: &str = "tetherd.sock";

const CONFIG_FILENAME: &str = "config.toml";

const APP_DIR: &str = "tether";

/// Get the default socket path, honouring `$TETHER_SOCKET`.
pub fn default_socket_path() -> PathBuf {
    if let Ok(path) = std::env::var(TETHER_SOCKET_ENV) {
        return PathBuf::from(path);
    }

    socket_path_without_env()
}

/// Socket path derived from XDG variables only.
pub fn socket_path_without_env() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime_dir).join(APP_DIR).join(SOCKET_FILENAME);
    }

    let username = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    PathBuf::from(format!("/tmp/{}-{}", APP_DIR, username)).join(SOCKET_FILENAME)
}

/// Get the default config file path.
pub fn default_config_path() -> PathBuf {
    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home).join(APP_DIR).join(CONFIG_FILENAME);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join(CONFIG_FILENAME);
    }

    PathBuf::from("/etc").join(APP_DIR).join(CONFIG_FILENAME)
}

/// Get the default data directory, honouring `$TETHER_DATA_DIR`.
pub fn default_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var(TETHER_DATA_DIR_ENV) {
        return PathBuf::from(path);
    }

    data_dir_without_env()
}

/// Data directory derived from XDG variables only.
pub fn data_dir_without_env() -> PathBuf {
    if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(data_home).join(APP_DIR);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".local")
            .join("share")
            .join(APP_DIR);
    }

    PathBuf::from("/tmp").join(APP_DIR).join("data")
}

/// Directory for files the backend renders at apply time.
pub fn default_runtime_dir() -> PathBuf {
    socket_path_without_env()
        .parent()
        .map(|p| p.join("run"))
        .unwrap_or_else(|| PathBuf::from("/tmp").join(APP_DIR).join("run"))
}
