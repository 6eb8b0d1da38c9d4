//! tetherd - The tether background service
//!
//! This is the main entry point for the tetherd service.
//! It wires together all the components:
//! - Configuration loading
//! - Store initialization
//! - Session engine
//! - Linux share backend and interface inventory
//! - IPC server

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tether_config::{Settings, load_config_or_default};
use tether_core::{EngineOptions, SessionEngine};
use tether_host_linux::{LinuxShareBackend, SysfsInventory};
use tether_ipc::IpcServer;
use tether_store::{AuditEvent, AuditEventType, SqliteStore, Store};
use tether_util::{TETHER_DATA_DIR_ENV, TETHER_SOCKET_ENV, default_config_path};
use tetherd::{CommandHandler, spawn_status_forwarder};
use tokio::signal::unix::{SignalKind, signal};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// tetherd - Network sharing session service
#[derive(Parser, Debug)]
#[command(name = "tetherd")]
#[command(about = "Network sharing session service", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/tether/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Socket path override
    #[arg(short, long, env = TETHER_SOCKET_ENV)]
    socket: Option<PathBuf>,

    /// Data directory override
    #[arg(short, long, env = TETHER_DATA_DIR_ENV)]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// Main service state
struct Service {
    engine: Arc<SessionEngine>,
    ipc: Arc<IpcServer>,
    store: Arc<dyn Store>,
    settings: Settings,
}

impl Service {
    async fn new(args: &Args) -> Result<Self> {
        let settings = load_config_or_default(&args.config)
            .with_context(|| format!("Failed to load config from {:?}", args.config))?;

        info!(config_path = %args.config.display(), "Configuration loaded");

        let socket_path = args
            .socket
            .clone()
            .unwrap_or_else(|| settings.daemon.socket_path.clone());

        let data_dir = args
            .data_dir
            .clone()
            .unwrap_or_else(|| settings.daemon.data_dir.clone());

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

        let db_path = data_dir.join("tether.db");
        let store: Arc<dyn Store> = Arc::new(
            SqliteStore::open(&db_path)
                .with_context(|| format!("Failed to open database {:?}", db_path))?,
        );

        info!(db_path = %db_path.display(), "Store initialized");

        store.append_audit(AuditEvent::new(AuditEventType::ServiceStarted))?;

        let backend = Arc::new(LinuxShareBackend::new(settings.linux.clone()));
        let inventory = Arc::new(SysfsInventory::new());

        let engine = Arc::new(SessionEngine::new(
            backend,
            inventory,
            store.clone(),
            EngineOptions {
                apply_timeout: settings.session.apply_timeout,
                revert_timeout: settings.session.revert_timeout,
                observer_buffer: settings.session.observer_buffer,
                platform: settings.daemon.platform.clone(),
            },
        ));

        let mut ipc = IpcServer::new(&socket_path, settings.session.observer_buffer);
        ipc.start()
            .await
            .with_context(|| format!("Failed to bind socket {:?}", socket_path))?;

        info!(socket_path = %socket_path.display(), "IPC server started");

        Ok(Self {
            engine,
            ipc: Arc::new(ipc),
            store,
            settings,
        })
    }

    async fn run(self) -> Result<()> {
        let mut ipc_messages = self
            .ipc
            .take_message_receiver()
            .await
            .context("IPC message receiver already taken")?;

        let handler = Arc::new(CommandHandler::new(
            self.engine.clone(),
            self.store.clone(),
            self.ipc.clone(),
            self.settings.limits.requests_per_minute,
        ));

        let forwarder = spawn_status_forwarder(&self.engine, self.ipc.clone());

        let ipc_accept = self.ipc.clone();
        tokio::spawn(async move {
            if let Err(e) = ipc_accept.run().await {
                error!(error = %e, "IPC server error");
            }
        });

        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;
        let mut sighup =
            signal(SignalKind::hangup()).context("Failed to create SIGHUP handler")?;

        info!(platform = %self.engine.platform(), "Service running");

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    break;
                }
                _ = sighup.recv() => {
                    info!("Received SIGHUP, shutting down gracefully");
                    break;
                }

                msg = ipc_messages.recv() => match msg {
                    Some(msg) => handler.handle_message(msg).await,
                    None => {
                        warn!("IPC message channel closed");
                        break;
                    }
                },
            }
        }

        info!("Shutting down tetherd");

        // Leave the host as we found it
        if let Err(e) = self.engine.shutdown().await {
            warn!(error = %e, "Failed to stop active session on shutdown");
        }

        handler.announce_shutdown();
        forwarder.abort();

        if let Err(e) = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::ServiceStopped))
        {
            warn!(error = %e, "Failed to log service shutdown");
        }

        self.ipc.shutdown();

        info!("Shutdown complete");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "tetherd starting");

    let service = Service::new(&args).await?;
    service.run().await
}
