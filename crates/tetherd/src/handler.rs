//! IPC request dispatch

use std::sync::Arc;
use tether_api::{
    ClientInfo, ClientRole, Command, ErrorCode, ErrorInfo, Event, EventPayload, HealthStatus,
    Response, ResponsePayload,
};
use tether_core::{SessionEngine, SessionError};
use tether_ipc::{IpcServer, ServerMessage};
use tether_store::{AuditEvent, AuditEventType, Store, StoreError};
use tether_util::RateLimiter;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Routes client requests to the session engine and profile store
pub struct CommandHandler {
    engine: Arc<SessionEngine>,
    store: Arc<dyn Store>,
    ipc: Arc<IpcServer>,
    rate_limiter: Mutex<RateLimiter>,
}

/// Whether `role` may run `command`
pub fn is_permitted(role: ClientRole, command: &Command) -> bool {
    match command {
        Command::StartSharing { .. } | Command::StopSharing | Command::StartProfile { .. } => {
            role.can_control_sharing()
        }
        Command::SaveProfile { .. } | Command::DeleteProfile { .. } => role.can_edit_profiles(),
        _ => !command.is_mutating(),
    }
}

/// Commands that wait on the backend and run off the dispatch loop
fn calls_backend(command: &Command) -> bool {
    matches!(
        command,
        Command::StartSharing { .. } | Command::StopSharing | Command::StartProfile { .. }
    )
}

pub fn session_error_info(err: &SessionError) -> ErrorInfo {
    let code = match err {
        SessionError::Validation(_) => ErrorCode::ValidationFailed,
        SessionError::Conflict { .. } => ErrorCode::Conflict,
        SessionError::Apply(_) => ErrorCode::ApplyFailed,
    };
    ErrorInfo::new(code, err.to_string())
}

pub fn store_error_info(err: &StoreError) -> ErrorInfo {
    let code = match err {
        StoreError::NotFound(_) => ErrorCode::NotFound,
        StoreError::InvalidName(_) => ErrorCode::InvalidName,
        _ => ErrorCode::StoreError,
    };
    ErrorInfo::new(code, err.to_string())
}

impl CommandHandler {
    pub fn new(
        engine: Arc<SessionEngine>,
        store: Arc<dyn Store>,
        ipc: Arc<IpcServer>,
        requests_per_minute: usize,
    ) -> Self {
        Self {
            engine,
            store,
            ipc,
            rate_limiter: Mutex::new(RateLimiter::per_minute(requests_per_minute)),
        }
    }

    pub fn engine(&self) -> &Arc<SessionEngine> {
        &self.engine
    }

    fn audit(&self, event: AuditEventType) {
        if let Err(e) = self.store.append_audit(AuditEvent::new(event)) {
            warn!(error = %e, "Failed to record audit event");
        }
    }

    /// Handle one message from the IPC server
    pub async fn handle_message(self: &Arc<Self>, msg: ServerMessage) {
        match msg {
            ServerMessage::Request { client_id, request } => {
                let allowed = self.rate_limiter.lock().await.check(&client_id);
                if !allowed {
                    debug!(client_id = %client_id, "Rate limited");
                    let response = Response::error(
                        request.request_id,
                        ErrorInfo::new(ErrorCode::RateLimited, "Too many requests"),
                    );
                    let _ = self.ipc.send_response(&client_id, response).await;
                    return;
                }

                let Some(client) = self.ipc.get_client_info(&client_id).await else {
                    debug!(client_id = %client_id, "Request from departed client dropped");
                    return;
                };

                if calls_backend(&request.command) {
                    let handler = self.clone();
                    tokio::spawn(async move {
                        let response = handler
                            .handle_command(&client, request.request_id, request.command)
                            .await;
                        let _ = handler.ipc.send_response(&client_id, response).await;
                    });
                } else {
                    let response = self
                        .handle_command(&client, request.request_id, request.command)
                        .await;
                    let _ = self.ipc.send_response(&client_id, response).await;
                }
            }

            ServerMessage::ClientConnected { client_id, info } => {
                info!(
                    client_id = %client_id,
                    role = ?info.role,
                    uid = ?info.uid,
                    "Client connected"
                );

                self.audit(AuditEventType::ClientConnected {
                    client_id: client_id.to_string(),
                    role: format!("{:?}", info.role),
                    uid: info.uid,
                });
            }

            ServerMessage::ClientDisconnected { client_id } => {
                debug!(client_id = %client_id, "Client disconnected");

                self.audit(AuditEventType::ClientDisconnected {
                    client_id: client_id.to_string(),
                });

                self.rate_limiter.lock().await.remove_client(&client_id);
            }
        }
    }

    /// Execute a command on behalf of `client`
    pub async fn handle_command(
        &self,
        client: &ClientInfo,
        request_id: u64,
        command: Command,
    ) -> Response {
        if !is_permitted(client.role, &command) {
            info!(
                client_id = %client.client_id,
                role = ?client.role,
                command = ?command,
                "Permission denied"
            );
            return Response::error(
                request_id,
                ErrorInfo::new(ErrorCode::PermissionDenied, "Admin role required"),
            );
        }

        let result = match command {
            Command::GetStatus => Ok(ResponsePayload::Status(self.engine.snapshot())),

            Command::ListInterfaces => match self.engine.list_interfaces() {
                Ok(interfaces) => Ok(ResponsePayload::Interfaces { interfaces }),
                Err(e) => {
                    warn!(error = %e, "Interface inventory failed");
                    Err(ErrorInfo::new(ErrorCode::InventoryUnavailable, e.to_string()))
                }
            },

            Command::StartSharing { config } => self
                .engine
                .start(config)
                .await
                .map(ResponsePayload::Started)
                .map_err(|e| session_error_info(&e)),

            Command::StopSharing => self
                .engine
                .stop()
                .await
                .map(ResponsePayload::Stopped)
                .map_err(|e| session_error_info(&e)),

            Command::StartProfile { name } => match self.store.get_profile(&name) {
                Ok(profile) => {
                    info!(profile = %name, "Starting sharing from profile");
                    self.engine
                        .start(profile.config)
                        .await
                        .map(ResponsePayload::Started)
                        .map_err(|e| session_error_info(&e))
                }
                Err(e) => Err(store_error_info(&e)),
            },

            Command::ListProfiles => self
                .store
                .list_profiles()
                .map(|names| ResponsePayload::Profiles { names })
                .map_err(|e| store_error_info(&e)),

            Command::SaveProfile { name, config } => {
                match self.store.save_profile(&name, &config) {
                    Ok(profile) => {
                        info!(profile = %profile.name, mode = %config.mode, "Profile saved");
                        self.audit(AuditEventType::ProfileSaved { name: name.clone() });
                        Ok(ResponsePayload::ProfileSaved { name })
                    }
                    Err(e) => Err(store_error_info(&e)),
                }
            }

            Command::LoadProfile { name } => self
                .store
                .get_profile(&name)
                .map(|profile| ResponsePayload::Profile {
                    name: profile.name,
                    config: profile.config,
                })
                .map_err(|e| store_error_info(&e)),

            Command::DeleteProfile { name } => match self.store.delete_profile(&name) {
                Ok(()) => {
                    info!(profile = %name, "Profile deleted");
                    self.audit(AuditEventType::ProfileDeleted { name: name.clone() });
                    Ok(ResponsePayload::ProfileDeleted { name })
                }
                Err(e) => Err(store_error_info(&e)),
            },

            Command::SubscribeStatus => {
                // Subscribe before reading the snapshot so no later change is missed
                self.ipc.set_subscribed(&client.client_id, true).await;
                Ok(ResponsePayload::Subscribed {
                    client_id: client.client_id.clone(),
                    snapshot: self.engine.snapshot(),
                })
            }

            Command::UnsubscribeStatus => {
                self.ipc.set_subscribed(&client.client_id, false).await;
                Ok(ResponsePayload::Unsubscribed)
            }

            Command::GetHealth => Ok(ResponsePayload::Health(self.health().await)),

            Command::Ping => Ok(ResponsePayload::Pong),
        };

        match result {
            Ok(payload) => Response::success(request_id, payload),
            Err(error) => Response::error(request_id, error),
        }
    }

    pub async fn health(&self) -> HealthStatus {
        let backend_issues = self.engine.backend_diagnostics();
        let backend_ok = backend_issues.is_empty();
        let store_ok = self.store.is_healthy();
        HealthStatus {
            live: true,
            ready: backend_ok && store_ok,
            backend_ok,
            store_ok,
            inventory_ok: self.engine.list_interfaces().is_ok(),
            observers: self.ipc.subscriber_count().await,
            backend_issues,
        }
    }

    /// Tell subscribers the service is going away
    pub fn announce_shutdown(&self) {
        self.ipc.broadcast_event(Event::new(EventPayload::Shutdown));
    }
}

/// Push every engine status change to subscribed IPC clients
pub fn spawn_status_forwarder(engine: &SessionEngine, ipc: Arc<IpcServer>) -> JoinHandle<()> {
    let mut observer = engine.subscribe();
    tokio::spawn(async move {
        while let Some(snapshot) = observer.recv().await {
            debug!(active = snapshot.active, phase = %snapshot.phase, "Forwarding status change");
            ipc.broadcast_event(Event::new(EventPayload::StatusChanged(snapshot)));
        }
    })
}
