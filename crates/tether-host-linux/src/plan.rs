//! Host command plans for each sharing mode
//!
//! A plan is a pure description: nothing here touches the host. The backend
//! executes the steps in order and runs the `undo` actions in reverse to
//! revert or roll back.

use std::fmt;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use tether_api::{SharingConfig, SharingMode};
use tether_config::LinuxSettings;
use tether_host_api::{HostError, HostResult};
use tether_util::Ipv4Cidr;

pub const HOSTAPD_CONF_NAME: &str = "hostapd.conf";
pub const DNSMASQ_CONF_NAME: &str = "dnsmasq.conf";

/// Long-running helper daemons started by a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Helper {
    Hostapd,
    Dnsmasq,
}

impl fmt::Display for Helper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Helper::Hostapd => f.write_str("hostapd"),
            Helper::Dnsmasq => f.write_str("dnsmasq"),
        }
    }
}

/// One host operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Run a tool to completion; a non-zero exit is a failure
    Run { program: PathBuf, args: Vec<String> },
    /// Write a file readable only by the daemon user
    WriteFile { path: PathBuf, contents: String },
    RemoveFile { path: PathBuf },
    /// Start a helper daemon in its own process group
    Spawn {
        helper: Helper,
        program: PathBuf,
        args: Vec<String>,
    },
    Terminate { helper: Helper },
}

impl Action {
    fn run(program: &Path, args: &[&str]) -> Self {
        Action::Run {
            program: program.to_path_buf(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Succeeds even when the thing it undoes never happened
    pub(crate) fn tolerates_missing(&self) -> bool {
        matches!(self, Action::RemoveFile { .. } | Action::Terminate { .. })
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Run { program, args } | Action::Spawn { program, args, .. } => {
                write!(f, "{}", program.display())?;
                for arg in args {
                    write!(f, " {}", arg)?;
                }
                Ok(())
            }
            Action::WriteFile { path, .. } => write!(f, "write {}", path.display()),
            Action::RemoveFile { path } => write!(f, "remove {}", path.display()),
            Action::Terminate { helper } => write!(f, "terminate {}", helper),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub action: Action,
    /// Reverses `action`; None when nothing needs undoing
    pub undo: Option<Action>,
}

impl Step {
    fn new(action: Action, undo: Action) -> Self {
        Self {
            action,
            undo: Some(undo),
        }
    }

    fn once(action: Action) -> Self {
        Self { action, undo: None }
    }
}

/// Host settings a plan has to preserve
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostState {
    /// `net.ipv4.ip_forward` before sharing started
    pub ip_forward: bool,
}

/// Ordered host operations that realize one sharing config
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharePlan {
    pub mode: SharingMode,
    pub steps: Vec<Step>,
}

impl SharePlan {
    pub fn build(
        config: &SharingConfig,
        settings: &LinuxSettings,
        host: &HostState,
    ) -> HostResult<Self> {
        let steps = match config.mode {
            SharingMode::Bridge => bridge_steps(config, settings),
            SharingMode::Nat => routed_steps(config, settings, host, false)?,
            SharingMode::Hotspot => routed_steps(config, settings, host, true)?,
        };

        Ok(Self {
            mode: config.mode,
            steps,
        })
    }
}

fn bridge_steps(config: &SharingConfig, settings: &LinuxSettings) -> Vec<Step> {
    let ip = &settings.tools.ip;
    let bridge = settings.bridge_name.as_str();

    let mut steps = vec![Step::new(
        Action::run(ip, &["link", "add", "name", bridge, "type", "bridge"]),
        Action::run(ip, &["link", "delete", bridge, "type", "bridge"]),
    )];

    for member in [config.source.as_str(), config.target.as_str()] {
        steps.push(Step::new(
            Action::run(ip, &["link", "set", member, "master", bridge]),
            Action::run(ip, &["link", "set", member, "nomaster"]),
        ));
    }

    steps.push(Step::once(Action::run(ip, &["link", "set", bridge, "up"])));
    steps
}

/// NAT, optionally with a hostapd access point on the target
fn routed_steps(
    config: &SharingConfig,
    settings: &LinuxSettings,
    host: &HostState,
    hotspot: bool,
) -> HostResult<Vec<Step>> {
    let tools = &settings.tools;
    let source = config.source.as_str();
    let target = config.target.as_str();

    let range = match &config.ip_range {
        Some(range) => range
            .parse::<Ipv4Cidr>()
            .map_err(|e| HostError::ApplyFailed(format!("ip_range: {}", e)))?,
        None => settings.default_ip_range,
    };
    let gateway = range
        .gateway()
        .ok_or_else(|| HostError::ApplyFailed(format!("{} has no host addresses", range)))?;
    let (dhcp_first, dhcp_last) = dhcp_bounds(&range, settings.dhcp_first_host, settings.dhcp_last_host)
        .ok_or_else(|| HostError::ApplyFailed(format!("{} is too small for DHCP", range)))?;
    let address = format!("{}/{}", gateway, range.prefix());

    let mut steps = vec![
        Step::once(Action::run(&tools.ip, &["addr", "flush", "dev", target])),
        Step::new(
            Action::run(&tools.ip, &["addr", "add", address.as_str(), "dev", target]),
            Action::run(&tools.ip, &["addr", "del", address.as_str(), "dev", target]),
        ),
        Step::once(Action::run(&tools.ip, &["link", "set", target, "up"])),
    ];

    if hotspot {
        check_hostapd_values(config, settings)?;
        let path = settings.runtime_dir.join(HOSTAPD_CONF_NAME);
        let contents = render_hostapd_conf(config, settings);
        steps.push(Step::new(
            Action::WriteFile {
                path: path.clone(),
                contents,
            },
            Action::RemoveFile { path: path.clone() },
        ));
        steps.push(Step::new(
            Action::Spawn {
                helper: Helper::Hostapd,
                program: tools.hostapd.clone(),
                args: vec![path.display().to_string()],
            },
            Action::Terminate {
                helper: Helper::Hostapd,
            },
        ));
    }

    let path = settings.runtime_dir.join(DNSMASQ_CONF_NAME);
    let contents = render_dnsmasq_conf(target, gateway, dhcp_first, dhcp_last, settings);
    steps.push(Step::new(
        Action::WriteFile {
            path: path.clone(),
            contents,
        },
        Action::RemoveFile { path: path.clone() },
    ));
    steps.push(Step::new(
        Action::Spawn {
            helper: Helper::Dnsmasq,
            program: tools.dnsmasq.clone(),
            args: vec!["-C".into(), path.display().to_string(), "-d".into()],
        },
        Action::Terminate {
            helper: Helper::Dnsmasq,
        },
    ));

    // Forwarding the host already had stays on after revert
    if !host.ip_forward {
        steps.push(Step::new(
            Action::run(&tools.sysctl, &["-w", "net.ipv4.ip_forward=1"]),
            Action::run(&tools.sysctl, &["-w", "net.ipv4.ip_forward=0"]),
        ));
    }

    let rules: [&[&str]; 3] = [
        &["-t", "nat", "POSTROUTING", "-o", source, "-j", "MASQUERADE"],
        &[
            "FORWARD", "-i", source, "-o", target, "-m", "state", "--state",
            "RELATED,ESTABLISHED", "-j", "ACCEPT",
        ],
        &["FORWARD", "-i", target, "-o", source, "-j", "ACCEPT"],
    ];
    for rule in rules {
        steps.push(Step::new(
            Action::run(&tools.iptables, &iptables_args("-A", rule)),
            Action::run(&tools.iptables, &iptables_args("-D", rule)),
        ));
    }

    Ok(steps)
}

// Insert the append/delete flag before the chain name, after any `-t table`
fn iptables_args<'a>(op: &'a str, rule: &[&'a str]) -> Vec<&'a str> {
    let split = if rule.first() == Some(&"-t") { 2 } else { 0 };
    let mut args = rule[..split].to_vec();
    args.push(op);
    args.extend_from_slice(&rule[split..]);
    args
}

/// DHCP pool inside `range`, clamped so it never includes the gateway
fn dhcp_bounds(range: &Ipv4Cidr, first: u32, last: u32) -> Option<(Ipv4Addr, Ipv4Addr)> {
    let count = range.host_count();
    if count < 2 {
        return None;
    }
    let first = first.clamp(2, count);
    let last = last.clamp(first, count);
    Some((range.host(first)?, range.host(last)?))
}

/// hostapd.conf takes one directive per line; no value may contain a
/// control character
fn check_hostapd_values(config: &SharingConfig, settings: &LinuxSettings) -> HostResult<()> {
    let values = [
        ("interface", Some(config.target.as_str())),
        ("driver", Some(settings.hostapd_driver.as_str())),
        ("ssid", Some(config.ssid.as_deref().unwrap_or(&settings.default_ssid))),
        ("wpa_passphrase", config.effective_password()),
    ];
    for (field, value) in values {
        if value.is_some_and(|v| v.chars().any(char::is_control)) {
            return Err(HostError::ApplyFailed(format!(
                "{} contains control characters",
                field
            )));
        }
    }
    Ok(())
}

pub fn render_hostapd_conf(config: &SharingConfig, settings: &LinuxSettings) -> String {
    let ssid = config.ssid.as_deref().unwrap_or(&settings.default_ssid);
    let channel = config.channel.unwrap_or(settings.default_channel);
    let hw_mode = if channel > 14 { "a" } else { "g" };

    let mut conf = format!(
        "interface={}\n\
         driver={}\n\
         ssid={}\n\
         hw_mode={}\n\
         channel={}\n\
         wmm_enabled=0\n\
         macaddr_acl=0\n\
         auth_algs=1\n\
         ignore_broadcast_ssid=0\n",
        config.target, settings.hostapd_driver, ssid, hw_mode, channel
    );

    if let Some(password) = config.effective_password() {
        conf.push_str(&format!(
            "wpa=2\n\
             wpa_passphrase={}\n\
             wpa_key_mgmt=WPA-PSK\n\
             rsn_pairwise=CCMP\n",
            password
        ));
    }

    conf
}

pub fn render_dnsmasq_conf(
    interface: &str,
    gateway: Ipv4Addr,
    first: Ipv4Addr,
    last: Ipv4Addr,
    settings: &LinuxSettings,
) -> String {
    let mut conf = format!(
        "interface={}\n\
         bind-interfaces\n\
         dhcp-range={},{},{}\n\
         dhcp-option=3,{}\n",
        interface, first, last, settings.dhcp_lease, gateway
    );
    if !settings.dns_servers.is_empty() {
        conf.push_str(&format!("dhcp-option=6,{}\n", settings.dns_servers.join(",")));
    }
    conf
}
