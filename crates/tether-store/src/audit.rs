//! Audit event types

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tether_api::SharingMode;
use tether_util::{ProfileName, SessionId};

/// Types of audit events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    /// Daemon started
    ServiceStarted,

    /// Daemon stopped
    ServiceStopped,

    /// Sharing became active
    SharingStarted {
        session_id: SessionId,
        mode: SharingMode,
        source: String,
        target: String,
    },

    /// Sharing stopped cleanly
    SharingStopped {
        session_id: SessionId,
        uptime_secs: u64,
    },

    /// Backend apply failed; session stayed inactive
    ApplyFailed {
        mode: SharingMode,
        source: String,
        target: String,
        error: String,
    },

    /// Backend revert failed; session was forced inactive and the host may
    /// still be configured
    RevertFailed {
        session_id: Option<SessionId>,
        error: String,
    },

    ProfileSaved { name: ProfileName },

    ProfileDeleted { name: ProfileName },

    /// Client connected
    ClientConnected {
        client_id: String,
        role: String,
        uid: Option<u32>,
    },

    /// Client disconnected
    ClientDisconnected { client_id: String },
}

/// Full audit event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub id: i64,

    /// Event timestamp
    pub timestamp: DateTime<Local>,

    /// Event type and details
    pub event: AuditEventType,
}

impl AuditEvent {
    pub fn new(event: AuditEventType) -> Self {
        Self {
            id: 0, // assigned by the store
            timestamp: tether_util::now(),
            event,
        }
    }
}
