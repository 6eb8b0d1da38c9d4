//! tetherctl - Command-line client for tetherd
//!
//! ```bash
//! tetherctl interfaces
//! tetherctl start hotspot eth0 wlan0 --ssid Cafe --password longenough
//! tetherctl watch
//! tetherctl stop
//! ```

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tether_api::{Command, EventPayload, ResponsePayload, SharingConfig, SharingMode};
use tether_ipc::IpcClient;
use tether_util::{ProfileName, TETHER_SOCKET_ENV, socket_path_without_env};
use tracing::debug;

mod output;

/// tetherctl - Control network sharing through tetherd
#[derive(Parser, Debug)]
#[command(name = "tetherctl")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Daemon socket path
    #[arg(short, long, env = TETHER_SOCKET_ENV, default_value_os_t = socket_path_without_env())]
    socket: PathBuf,

    /// Print raw JSON payloads instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// List host network interfaces
    Interfaces,

    /// Show the current sharing session
    Status,

    /// Start sharing
    Start(StartArgs),

    /// Stop the active session
    Stop,

    /// Manage saved profiles
    #[command(subcommand)]
    Profile(ProfileCommand),

    /// Stream status changes until interrupted
    Watch,

    /// Show daemon health
    Health,

    /// Check that the daemon answers
    Ping,
}

#[derive(clap::Args, Debug)]
struct StartArgs {
    /// bridge, hotspot or nat
    mode: SharingMode,

    /// Interface with upstream connectivity
    source: String,

    /// Interface that receives the shared connection
    target: String,

    /// Hotspot network name
    #[arg(long)]
    ssid: Option<String>,

    /// Hotspot passphrase (8-63 characters)
    #[arg(long)]
    password: Option<String>,

    /// Hotspot radio channel
    #[arg(long)]
    channel: Option<u32>,

    /// Address range handed out on the target, e.g. 192.168.50.0/24
    #[arg(long)]
    ip_range: Option<String>,
}

impl StartArgs {
    fn into_config(self) -> SharingConfig {
        SharingConfig {
            mode: self.mode,
            source: self.source,
            target: self.target,
            ssid: self.ssid,
            password: self.password,
            channel: self.channel,
            ip_range: self.ip_range,
        }
    }
}

#[derive(Subcommand, Debug)]
enum ProfileCommand {
    /// List saved profiles
    List,

    /// Save a profile
    Save {
        name: String,
        #[command(flatten)]
        config: StartArgs,
    },

    /// Show a saved profile
    Show { name: String },

    /// Delete a saved profile
    Delete { name: String },

    /// Start sharing from a saved profile
    Start { name: String },
}

impl CliCommand {
    fn into_request(self) -> Option<Command> {
        let command = match self {
            CliCommand::Interfaces => Command::ListInterfaces,
            CliCommand::Status => Command::GetStatus,
            CliCommand::Start(args) => Command::StartSharing {
                config: args.into_config(),
            },
            CliCommand::Stop => Command::StopSharing,
            CliCommand::Profile(ProfileCommand::List) => Command::ListProfiles,
            CliCommand::Profile(ProfileCommand::Save { name, config }) => Command::SaveProfile {
                name: ProfileName::new(name),
                config: config.into_config(),
            },
            CliCommand::Profile(ProfileCommand::Show { name }) => Command::LoadProfile {
                name: ProfileName::new(name),
            },
            CliCommand::Profile(ProfileCommand::Delete { name }) => Command::DeleteProfile {
                name: ProfileName::new(name),
            },
            CliCommand::Profile(ProfileCommand::Start { name }) => Command::StartProfile {
                name: ProfileName::new(name),
            },
            CliCommand::Health => Command::GetHealth,
            CliCommand::Ping => Command::Ping,
            CliCommand::Watch => return None,
        };
        Some(command)
    }
}

fn render(payload: &ResponsePayload) -> String {
    match payload {
        ResponsePayload::Status(snap) => output::render_snapshot(snap),
        ResponsePayload::Started(snap) => {
            format!("Started\n{}", output::render_snapshot(snap))
        }
        ResponsePayload::Stopped(_) => "Stopped".to_string(),
        ResponsePayload::Interfaces { interfaces } => output::render_interfaces(interfaces),
        ResponsePayload::Profiles { names } => output::render_profiles(names),
        ResponsePayload::ProfileSaved { name } => format!("Saved profile {}", name),
        ResponsePayload::Profile { name, config } => output::render_profile(name, config),
        ResponsePayload::ProfileDeleted { name } => format!("Deleted profile {}", name),
        ResponsePayload::Subscribed { snapshot, .. } => output::render_snapshot(snapshot),
        ResponsePayload::Unsubscribed => "Unsubscribed".to_string(),
        ResponsePayload::Health(health) => output::render_health(health),
        ResponsePayload::Pong => "pong".to_string(),
    }
}

fn print_payload(payload: &ResponsePayload, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(payload)?);
    } else {
        println!("{}", render(payload));
    }
    Ok(())
}

async fn watch(client: &mut IpcClient, json: bool) -> Result<()> {
    let snapshot = client.subscribe().await?;
    if json {
        println!("{}", serde_json::to_string(&snapshot)?);
    } else {
        println!("{}", output::render_snapshot(&snapshot));
    }

    loop {
        let event = tokio::select! {
            event = client.next_event() => event?,
            _ = tokio::signal::ctrl_c() => return Ok(()),
        };

        if json {
            println!("{}", serde_json::to_string(&event)?);
        } else {
            println!("{}", output::render_event(&event));
        }

        if matches!(event.payload, EventPayload::Shutdown) {
            return Ok(());
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    debug!(socket = %cli.socket.display(), "Connecting to tetherd");

    let mut client = IpcClient::connect(&cli.socket)
        .await
        .with_context(|| format!("Cannot reach tetherd at {}", cli.socket.display()))?;

    let Some(request) = cli.command.into_request() else {
        return watch(&mut client, cli.json).await;
    };

    let response = client.send(request).await?;
    match response.result {
        tether_api::ResponseResult::Ok(payload) => print_payload(&payload, cli.json),
        tether_api::ResponseResult::Err(e) => bail!("{}: {}", e.code, e.message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hotspot_start() {
        let cli = Cli::try_parse_from([
            "tetherctl",
            "--socket",
            "/tmp/t.sock",
            "start",
            "hotspot",
            "eth0",
            "wlan0",
            "--ssid",
            "Cafe",
            "--password",
            "longenough",
            "--channel",
            "6",
        ])
        .unwrap();

        match cli.command.into_request() {
            Some(Command::StartSharing { config }) => {
                assert_eq!(config.mode, SharingMode::Hotspot);
                assert_eq!(config.source, "eth0");
                assert_eq!(config.target, "wlan0");
                assert_eq!(config.ssid.as_deref(), Some("Cafe"));
                assert_eq!(config.channel, Some(6));
                assert_eq!(config.ip_range, None);
            }
            other => panic!("unexpected request {:?}", other),
        }
    }

    #[test]
    fn rejects_unknown_mode() {
        let result = Cli::try_parse_from(["tetherctl", "start", "mesh", "eth0", "wlan0"]);
        assert!(result.is_err());
    }

    #[test]
    fn profile_subcommands() {
        let cli = Cli::try_parse_from(["tetherctl", "profile", "start", "cafe"]).unwrap();
        assert!(matches!(
            cli.command.into_request(),
            Some(Command::StartProfile { name }) if name.as_str() == "cafe"
        ));

        let cli = Cli::try_parse_from([
            "tetherctl", "profile", "save", "home", "bridge", "eth0", "eth1",
        ])
        .unwrap();
        assert!(matches!(
            cli.command.into_request(),
            Some(Command::SaveProfile { config, .. }) if config.mode == SharingMode::Bridge
        ));

        let cli = Cli::try_parse_from(["tetherctl", "watch"]).unwrap();
        assert!(cli.command.into_request().is_none());
    }
}
