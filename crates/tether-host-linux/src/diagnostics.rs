//! Host readiness checks for the Linux backend

use nix::unistd::Uid;
use std::ffi::OsStr;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tether_config::ToolPaths;

/// Resolve `program` the way the shell would.
///
/// Paths with a directory part are taken as given; bare names are looked up
/// in `search_path`.
pub fn find_executable(program: &Path, search_path: Option<&OsStr>) -> Option<PathBuf> {
    if program.components().count() > 1 || program.is_absolute() {
        return is_executable(program).then(|| program.to_path_buf());
    }

    std::env::split_paths(search_path?)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// One message per configured tool that cannot be executed
pub fn missing_tools(tools: &ToolPaths, search_path: Option<&OsStr>) -> Vec<String> {
    [
        ("ip", &tools.ip),
        ("sysctl", &tools.sysctl),
        ("iptables", &tools.iptables),
        ("hostapd", &tools.hostapd),
        ("dnsmasq", &tools.dnsmasq),
    ]
    .into_iter()
    .filter(|(_, path)| find_executable(path, search_path).is_none())
    .map(|(name, path)| format!("{} not found at {}", name, path.display()))
    .collect()
}

/// Changing links, forwarding and firewall rules needs root
pub fn privilege_issue(euid: Uid) -> Option<String> {
    (!euid.is_root()).then(|| format!("running as uid {}, root privileges are required", euid))
}
