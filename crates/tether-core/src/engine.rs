//! Sharing session engine

use std::future::Future;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tether_api::{Interface, SessionPhase, SessionSnapshot, SharingConfig};
use tether_host_api::{
    BackendCapabilities, HostError, HostResult, InterfaceInventory, InventoryResult, ShareBackend,
};
use tether_store::{AuditEvent, AuditEventType, Store};
use tether_util::MonotonicInstant;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::{
    SessionError, SessionResult, SessionState, StatusBroadcaster, StatusObserver,
    validate_sharing_config,
};

/// Engine tuning, normally taken from the `[session]` config section
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// None disables the timeout
    pub apply_timeout: Option<Duration>,
    /// None disables the timeout
    pub revert_timeout: Option<Duration>,
    pub observer_buffer: usize,
    /// Overrides the backend's platform label
    pub platform: Option<String>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            apply_timeout: Some(Duration::from_secs(30)),
            revert_timeout: Some(Duration::from_secs(30)),
            observer_buffer: 16,
            platform: None,
        }
    }
}

/// Owns the single sharing session.
///
/// `start` and `stop` claim the session by flipping its phase inside one
/// write-lock critical section, then call the backend with no lock held.
/// A second transition arriving meanwhile sees `Starting`/`Stopping` and is
/// rejected with [`SessionError::Conflict`].
pub struct SessionEngine {
    backend: Arc<dyn ShareBackend>,
    inventory: Arc<dyn InterfaceInventory>,
    store: Arc<dyn Store>,
    state: RwLock<SessionState>,
    broadcaster: StatusBroadcaster,
    /// Signalled whenever a start or stop finishes
    settled: Notify,
    options: EngineOptions,
    platform: String,
}

impl SessionEngine {
    pub fn new(
        backend: Arc<dyn ShareBackend>,
        inventory: Arc<dyn InterfaceInventory>,
        store: Arc<dyn Store>,
        options: EngineOptions,
    ) -> Self {
        let platform = options
            .platform
            .clone()
            .unwrap_or_else(|| backend.capabilities().platform.clone());
        let broadcaster = StatusBroadcaster::new(
            options.observer_buffer,
            SessionSnapshot::inactive(platform.as_str()),
        );

        info!(
            platform = %platform,
            modes = ?backend.capabilities().modes,
            "Session engine initialized"
        );

        Self {
            backend,
            inventory,
            store,
            state: RwLock::new(SessionState::new()),
            broadcaster,
            settled: Notify::new(),
            options,
            platform,
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, SessionState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn audit(&self, event: AuditEventType) {
        if let Err(e) = self.store.append_audit(AuditEvent::new(event)) {
            warn!(error = %e, "Failed to record audit event");
        }
    }

    pub fn capabilities(&self) -> &BackendCapabilities {
        self.backend.capabilities()
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    /// Current session view. Never waits on an in-flight backend call.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.read_state()
            .to_snapshot(&self.platform, MonotonicInstant::now())
    }

    pub fn phase(&self) -> SessionPhase {
        self.read_state().phase()
    }

    pub fn list_interfaces(&self) -> InventoryResult<Vec<Interface>> {
        self.inventory.list()
    }

    /// Join the status stream. Pair with [`snapshot`](Self::snapshot) to
    /// learn the state as of joining.
    pub fn subscribe(&self) -> StatusObserver {
        self.broadcaster.subscribe()
    }

    /// Problems the backend reports with its host tooling
    pub fn backend_diagnostics(&self) -> Vec<String> {
        self.backend.diagnostics()
    }

    /// Validate `config`, apply it, and make it the active session
    pub async fn start(&self, config: SharingConfig) -> SessionResult<SessionSnapshot> {
        let interfaces = match self.inventory.list() {
            Ok(interfaces) => interfaces,
            Err(e) => {
                warn!(error = %e, "Interface inventory unavailable, validating against none");
                Vec::new()
            }
        };

        let issues = validate_sharing_config(&config, &interfaces, self.backend.capabilities());
        if !issues.is_empty() {
            info!(
                mode = %config.mode,
                source = %config.source,
                target = %config.target,
                issue_count = issues.len(),
                "Sharing config rejected"
            );
            return Err(SessionError::Validation(issues));
        }

        self.write_state()
            .begin_start(config.clone())
            .map_err(|phase| SessionError::Conflict { phase })?;

        info!(
            mode = %config.mode,
            source = %config.source,
            target = %config.target,
            "Applying sharing config"
        );

        let result = with_timeout(self.options.apply_timeout, self.backend.apply(&config)).await;

        if let Err(e) = result {
            if matches!(e, HostError::Timeout(_)) {
                self.roll_back_abandoned_apply(&config).await;
            }
            self.write_state().reset();
            self.settled.notify_waiters();
            warn!(error = %e, mode = %config.mode, "Apply failed, session stays inactive");
            self.audit(AuditEventType::ApplyFailed {
                mode: config.mode,
                source: config.source.clone(),
                target: config.target.clone(),
                error: e.to_string(),
            });
            return Err(SessionError::Apply(e));
        }

        let (snapshot, session_id) = {
            let mut state = self.write_state();
            let session_id = state
                .activate(tether_util::now(), MonotonicInstant::now())
                .map(|session| session.session_id.clone());
            (
                state.to_snapshot(&self.platform, MonotonicInstant::now()),
                session_id,
            )
        };
        self.settled.notify_waiters();
        let session_id = session_id.ok_or_else(|| {
            SessionError::Apply(HostError::Internal(
                "session left the starting phase during apply".into(),
            ))
        })?;

        info!(session_id = %session_id, mode = %config.mode, "Sharing active");
        self.audit(AuditEventType::SharingStarted {
            session_id,
            mode: config.mode,
            source: config.source,
            target: config.target,
        });
        self.broadcaster.publish(snapshot.clone());

        Ok(snapshot)
    }

    /// Revert the active session.
    ///
    /// The session always ends up `Inactive`. If the backend fails to revert,
    /// the host may still be configured; that is logged and audited and the
    /// backend error is returned.
    pub async fn stop(&self) -> SessionResult<SessionSnapshot> {
        let session_id = self
            .write_state()
            .begin_stop()
            .map(|session| session.session_id.clone())
            .map_err(|phase| SessionError::Conflict { phase })?;

        info!(session_id = %session_id, "Reverting sharing config");

        let result = with_timeout(self.options.revert_timeout, self.backend.revert()).await;

        let (snapshot, ended) = {
            let mut state = self.write_state();
            let ended = state.reset();
            (
                state.to_snapshot(&self.platform, MonotonicInstant::now()),
                ended,
            )
        };
        self.settled.notify_waiters();
        self.broadcaster.publish(snapshot.clone());

        match result {
            Ok(()) => {
                let uptime_secs = ended
                    .map(|s| s.uptime_secs(MonotonicInstant::now()))
                    .unwrap_or(0);
                info!(session_id = %session_id, uptime_secs, "Sharing stopped");
                self.audit(AuditEventType::SharingStopped {
                    session_id,
                    uptime_secs,
                });
                Ok(snapshot)
            }
            Err(e) => {
                warn!(
                    session_id = %session_id,
                    error = %e,
                    "Revert failed; session forced inactive, host configuration may need reconciliation"
                );
                self.audit(AuditEventType::RevertFailed {
                    session_id: Some(session_id),
                    error: e.to_string(),
                });
                Err(SessionError::Apply(e))
            }
        }
    }

    /// A timed-out apply was dropped part way through its plan. Ask the
    /// backend to undo whatever it managed to change.
    async fn roll_back_abandoned_apply(&self, config: &SharingConfig) {
        warn!(
            mode = %config.mode,
            target = %config.target,
            "Apply timed out; reverting partial host configuration"
        );

        match with_timeout(self.options.revert_timeout, self.backend.revert()).await {
            Ok(()) => info!("Partial host configuration reverted"),
            Err(HostError::NotApplied) => debug!("Backend recorded nothing to revert"),
            Err(e) => {
                warn!(
                    error = %e,
                    "Rollback after apply timeout failed, host configuration may need reconciliation"
                );
                self.audit(AuditEventType::RevertFailed {
                    session_id: None,
                    error: e.to_string(),
                });
            }
        }
    }

    /// Stop any active session before the process exits.
    ///
    /// A start or stop still in flight is allowed to finish first, so the
    /// host is never abandoned half configured.
    pub async fn shutdown(&self) -> SessionResult<()> {
        loop {
            let settled = self.settled.notified();
            tokio::pin!(settled);
            settled.as_mut().enable();

            match self.phase() {
                phase @ (SessionPhase::Starting | SessionPhase::Stopping) => {
                    info!(%phase, "Waiting for in-flight transition before shutdown");
                    settled.await;
                }
                SessionPhase::Active => {
                    info!("Stopping active session for shutdown");
                    return self.stop().await.map(|_| ());
                }
                SessionPhase::Inactive => {
                    debug!("No active session at shutdown");
                    return Ok(());
                }
            }
        }
    }
}

async fn with_timeout<F>(limit: Option<Duration>, call: F) -> HostResult<()>
where
    F: Future<Output = HostResult<()>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .unwrap_or(Err(HostError::Timeout(limit))),
        None => call.await,
    }
}
