//! Session state

use chrono::{DateTime, Local};
use tether_api::{SessionPhase, SessionSnapshot, SharingConfig};
use tether_util::{MonotonicInstant, SessionId};

/// A sharing arrangement the backend has applied
#[derive(Debug, Clone)]
pub struct ActiveSession {
    pub session_id: SessionId,

    pub config: SharingConfig,

    /// Wall-clock start time (for display/logging)
    pub started_at: DateTime<Local>,

    /// Monotonic start time (for uptime)
    pub started_at_mono: MonotonicInstant,
}

impl ActiveSession {
    pub fn new(config: SharingConfig, now: DateTime<Local>, now_mono: MonotonicInstant) -> Self {
        Self {
            session_id: SessionId::new(),
            config,
            started_at: now,
            started_at_mono: now_mono,
        }
    }

    pub fn uptime_secs(&self, now_mono: MonotonicInstant) -> u64 {
        now_mono.duration_since(self.started_at_mono).as_secs()
    }
}

/// The process-wide session record.
///
/// Only the engine mutates this, always under its write lock.
#[derive(Debug, Clone)]
pub struct SessionState {
    phase: SessionPhase,
    /// Config being applied while `Starting`
    pending: Option<SharingConfig>,
    /// Set while `Active` and `Stopping`
    active: Option<ActiveSession>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            phase: SessionPhase::Inactive,
            pending: None,
            active: None,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn active(&self) -> Option<&ActiveSession> {
        self.active.as_ref()
    }

    /// Inactive -> Starting. Returns the blocking phase otherwise.
    pub fn begin_start(&mut self, config: SharingConfig) -> Result<(), SessionPhase> {
        if self.phase != SessionPhase::Inactive {
            return Err(self.phase);
        }
        self.phase = SessionPhase::Starting;
        self.pending = Some(config);
        Ok(())
    }

    /// Starting -> Active. `None` if no start was in progress.
    pub fn activate(
        &mut self,
        now: DateTime<Local>,
        now_mono: MonotonicInstant,
    ) -> Option<&ActiveSession> {
        if self.phase != SessionPhase::Starting {
            return None;
        }
        let config = self.pending.take()?;
        self.phase = SessionPhase::Active;
        Some(self.active.insert(ActiveSession::new(config, now, now_mono)))
    }

    /// Active -> Stopping. Returns the blocking phase otherwise.
    pub fn begin_stop(&mut self) -> Result<&ActiveSession, SessionPhase> {
        if self.phase != SessionPhase::Active || self.active.is_none() {
            return Err(self.phase);
        }
        self.phase = SessionPhase::Stopping;
        self.active.as_ref().ok_or(self.phase)
    }

    /// Any phase -> Inactive, clearing all session fields
    pub fn reset(&mut self) -> Option<ActiveSession> {
        self.phase = SessionPhase::Inactive;
        self.pending = None;
        self.active.take()
    }

    pub fn to_snapshot(&self, platform: &str, now_mono: MonotonicInstant) -> SessionSnapshot {
        let mut snapshot = SessionSnapshot::inactive(platform);
        snapshot.phase = self.phase;
        snapshot.active = self.phase == SessionPhase::Active;

        if let Some(session) = &self.active {
            snapshot.mode = Some(session.config.mode);
            snapshot.source_interface = Some(session.config.source.clone());
            snapshot.target_interface = Some(session.config.target.clone());
            snapshot.session_id = Some(session.session_id.clone());
            snapshot.started_at = Some(session.started_at);
            snapshot.uptime = session.uptime_secs(now_mono);
        } else if let Some(pending) = &self.pending {
            snapshot.mode = Some(pending.mode);
            snapshot.source_interface = Some(pending.source.clone());
            snapshot.target_interface = Some(pending.target.clone());
        }

        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tether_api::SharingMode;

    fn nat() -> SharingConfig {
        SharingConfig::new(SharingMode::Nat, "eth0", "eth1")
    }

    #[test]
    fn full_lifecycle() {
        let mut state = SessionState::new();
        let t0 = MonotonicInstant::now();

        state.begin_start(nat()).unwrap();
        assert_eq!(state.phase(), SessionPhase::Starting);

        assert!(state.activate(tether_util::now(), t0).is_some());
        let snap = state.to_snapshot("linux", t0 + Duration::from_secs(90));
        assert!(snap.active);
        assert_eq!(snap.uptime, 90);
        assert_eq!(snap.source_interface.as_deref(), Some("eth0"));

        state.begin_stop().unwrap();
        assert_eq!(state.phase(), SessionPhase::Stopping);
        assert!(!state.to_snapshot("linux", t0).active);

        assert!(state.reset().is_some());
        let snap = state.to_snapshot("linux", t0);
        assert_eq!(snap, SessionSnapshot::inactive("linux"));
    }

    #[test]
    fn transitions_blocked_outside_their_phase() {
        let mut state = SessionState::new();
        assert_eq!(state.begin_stop().unwrap_err(), SessionPhase::Inactive);
        assert!(state.activate(tether_util::now(), MonotonicInstant::now()).is_none());

        state.begin_start(nat()).unwrap();
        assert_eq!(state.begin_start(nat()).unwrap_err(), SessionPhase::Starting);
        assert_eq!(state.begin_stop().unwrap_err(), SessionPhase::Starting);
    }

    #[test]
    fn starting_snapshot_shows_requested_endpoints() {
        let mut state = SessionState::new();
        state.begin_start(nat()).unwrap();

        let snap = state.to_snapshot("linux", MonotonicInstant::now());
        assert!(!snap.active);
        assert_eq!(snap.phase, SessionPhase::Starting);
        assert_eq!(snap.target_interface.as_deref(), Some("eth1"));
        assert_eq!(snap.uptime, 0);
    }
}
