//! Command types for the tetherd protocol

use serde::{Deserialize, Serialize};
use tether_util::{ClientId, ProfileName};

use crate::{API_VERSION, ClientRole, HealthStatus, Interface, SessionSnapshot, SharingConfig};

/// Request wrapper with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Request ID for correlation
    pub request_id: u64,
    /// API version
    pub api_version: u32,
    /// The command
    pub command: Command,
}

impl Request {
    pub fn new(request_id: u64, command: Command) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            command,
        }
    }
}

/// Response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Corresponding request ID
    pub request_id: u64,
    /// API version
    pub api_version: u32,
    /// Response payload or error
    pub result: ResponseResult,
}

impl Response {
    pub fn success(request_id: u64, payload: ResponsePayload) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Ok(payload),
        }
    }

    pub fn error(request_id: u64, error: ErrorInfo) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Err(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.result, ResponseResult::Ok(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseResult {
    Ok(ResponsePayload),
    Err(ErrorInfo),
}

/// Error information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Error codes for the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    /// Sharing config rejected before touching the host
    ValidationFailed,
    /// Request incompatible with the current session phase
    Conflict,
    /// The host backend failed; re-query status to learn the outcome
    ApplyFailed,
    NotFound,
    InvalidName,
    InventoryUnavailable,
    PermissionDenied,
    RateLimited,
    StoreError,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidRequest => "invalid_request",
            ErrorCode::ValidationFailed => "validation_failed",
            ErrorCode::Conflict => "conflict",
            ErrorCode::ApplyFailed => "apply_failed",
            ErrorCode::NotFound => "not_found",
            ErrorCode::InvalidName => "invalid_name",
            ErrorCode::InventoryUnavailable => "inventory_unavailable",
            ErrorCode::PermissionDenied => "permission_denied",
            ErrorCode::RateLimited => "rate_limited",
            ErrorCode::StoreError => "store_error",
            ErrorCode::InternalError => "internal_error",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// All possible commands from clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Get the current session snapshot
    GetStatus,

    /// Enumerate host network interfaces
    ListInterfaces,

    /// Start sharing with an explicit config
    StartSharing { config: SharingConfig },

    /// Stop the active sharing session
    StopSharing,

    /// Load a stored profile and start sharing with it
    StartProfile { name: ProfileName },

    ListProfiles,

    SaveProfile {
        name: ProfileName,
        config: SharingConfig,
    },

    LoadProfile { name: ProfileName },

    DeleteProfile { name: ProfileName },

    /// Subscribe to status pushes (returns immediately, events stream separately)
    SubscribeStatus,

    /// Unsubscribe from status pushes
    UnsubscribeStatus,

    /// Get health status
    GetHealth,

    /// Ping for keepalive
    Ping,
}

impl Command {
    /// Commands that change host or profile state
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Command::StartSharing { .. }
                | Command::StopSharing
                | Command::StartProfile { .. }
                | Command::SaveProfile { .. }
                | Command::DeleteProfile { .. }
        )
    }
}

/// Response payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsePayload {
    Status(SessionSnapshot),
    Interfaces { interfaces: Vec<Interface> },
    Started(SessionSnapshot),
    Stopped(SessionSnapshot),
    Profiles { names: Vec<ProfileName> },
    ProfileSaved { name: ProfileName },
    Profile {
        name: ProfileName,
        config: SharingConfig,
    },
    ProfileDeleted { name: ProfileName },
    Subscribed {
        client_id: ClientId,
        /// Current state, so a late joiner does not miss history
        snapshot: SessionSnapshot,
    },
    Unsubscribed,
    Health(HealthStatus),
    Pong,
}

/// Client connection info (set by IPC layer)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub client_id: ClientId,
    pub role: ClientRole,
    /// Unix UID if available
    pub uid: Option<u32>,
}

impl ClientInfo {
    pub fn new(role: ClientRole) -> Self {
        Self {
            client_id: ClientId::new(),
            role,
            uid: None,
        }
    }

    pub fn with_uid(mut self, uid: u32) -> Self {
        self.uid = Some(uid);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SharingMode;

    #[test]
    fn request_serialization() {
        let req = Request::new(1, Command::GetStatus);
        let json = serde_json::to_string(&req).unwrap();
        let parsed: Request = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.request_id, 1);
        assert!(matches!(parsed.command, Command::GetStatus));
    }

    #[test]
    fn start_sharing_wire_format() {
        let json = r#"{
            "request_id": 7,
            "api_version": 1,
            "command": {
                "type": "start_sharing",
                "config": {"mode": "bridge", "source": "eth0", "target": "eth1"}
            }
        }"#;
        let req: Request = serde_json::from_str(json).unwrap();

        match req.command {
            Command::StartSharing { config } => {
                assert_eq!(config.mode, SharingMode::Bridge);
                assert_eq!(config.target, "eth1");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn error_response_shape() {
        let resp = Response::error(3, ErrorInfo::new(ErrorCode::Conflict, "session already active"));
        let json = serde_json::to_value(&resp).unwrap();

        assert_eq!(json["result"]["err"]["code"], "conflict");
        assert_eq!(ErrorCode::Conflict.to_string(), "conflict");
        assert_eq!(json["result"]["err"]["message"], "session already active");
        assert!(!resp.is_ok());
    }

    #[test]
    fn status_response_serialization() {
        let resp = Response::success(1, ResponsePayload::Status(SessionSnapshot::inactive("linux")));

        let json = serde_json::to_string(&resp).unwrap();
        let parsed: Response = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.request_id, 1);
        match parsed.result {
            ResponseResult::Ok(ResponsePayload::Status(snap)) => assert_eq!(snap.platform, "linux"),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn mutating_commands() {
        assert!(Command::StopSharing.is_mutating());
        assert!(
            Command::DeleteProfile {
                name: ProfileName::new("x")
            }
            .is_mutating()
        );
        assert!(!Command::GetStatus.is_mutating());
        assert!(!Command::ListProfiles.is_mutating());
        assert!(
            !Command::LoadProfile {
                name: ProfileName::new("x")
            }
            .is_mutating()
        );
    }
}
