//! Human-readable rendering of daemon replies

use tether_api::{Event, EventPayload, HealthStatus, Interface, SessionSnapshot, SharingConfig};
use tether_util::{ProfileName, format_uptime};

fn or_dash(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}

pub fn render_snapshot(snap: &SessionSnapshot) -> String {
    if !snap.active {
        return format!("Sharing: {} (platform {})", snap.phase, snap.platform);
    }

    let mode = snap.mode.map(|m| m.as_str()).unwrap_or("-");
    let mut out = format!(
        "Sharing: active (platform {})\n  mode:    {}\n  source:  {}\n  target:  {}\n  uptime:  {}",
        snap.platform,
        mode,
        or_dash(snap.source_interface.as_deref()),
        or_dash(snap.target_interface.as_deref()),
        format_uptime(snap.uptime),
    );
    if let Some(id) = &snap.session_id {
        out.push_str(&format!("\n  session: {}", id));
    }
    out
}

pub fn render_interfaces(interfaces: &[Interface]) -> String {
    if interfaces.is_empty() {
        return "No interfaces found".to_string();
    }

    let width = interfaces.iter().map(|i| i.name.len()).max().unwrap_or(0);
    interfaces
        .iter()
        .map(|i| {
            format!(
                "{:<width$}  {:<8}  {:<4}  {:<15}  {}",
                i.name,
                i.kind.to_string(),
                if i.up { "up" } else { "down" },
                or_dash(i.ip.as_deref()),
                or_dash(i.mac.as_deref()),
                width = width,
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_profiles(names: &[ProfileName]) -> String {
    if names.is_empty() {
        return "No saved profiles".to_string();
    }
    names
        .iter()
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Profile contents. The passphrase is never printed.
pub fn render_profile(name: &ProfileName, config: &SharingConfig) -> String {
    let mut out = format!(
        "{}\n  mode:     {}\n  source:   {}\n  target:   {}",
        name, config.mode, config.source, config.target
    );
    if let Some(ssid) = &config.ssid {
        out.push_str(&format!("\n  ssid:     {}", ssid));
    }
    if config.password.is_some() {
        out.push_str("\n  password: (set)");
    }
    if let Some(channel) = config.channel {
        out.push_str(&format!("\n  channel:  {}", channel));
    }
    if let Some(range) = &config.ip_range {
        out.push_str(&format!("\n  ip range: {}", range));
    }
    out
}

pub fn render_health(health: &HealthStatus) -> String {
    let flag = |ok: bool| if ok { "ok" } else { "FAIL" };
    let mut out = format!(
        "ready:     {}\nbackend:   {}\nstore:     {}\ninventory: {}\nobservers: {}",
        if health.ready { "yes" } else { "no" },
        flag(health.backend_ok),
        flag(health.store_ok),
        flag(health.inventory_ok),
        health.observers,
    );
    for issue in &health.backend_issues {
        out.push_str(&format!("\n  - {}", issue));
    }
    out
}

pub fn render_event(event: &Event) -> String {
    let stamp = event.timestamp.format("%H:%M:%S");
    match &event.payload {
        EventPayload::StatusChanged(snap) if snap.active => format!(
            "[{}] sharing started: {} {} -> {}",
            stamp,
            snap.mode.map(|m| m.as_str()).unwrap_or("-"),
            or_dash(snap.source_interface.as_deref()),
            or_dash(snap.target_interface.as_deref()),
        ),
        EventPayload::StatusChanged(snap) => format!("[{}] sharing {}", stamp, snap.phase),
        EventPayload::Shutdown => format!("[{}] daemon shutting down", stamp),
    }
}
