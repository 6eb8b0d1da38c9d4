//! Host backend traits

use async_trait::async_trait;
use std::time::Duration;
use tether_api::{Interface, SharingConfig, SharingMode};
use thiserror::Error;

use crate::BackendCapabilities;

/// Errors from the network apply backend
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Apply failed: {0}")]
    ApplyFailed(String),

    #[error("Revert failed: {0}")]
    RevertFailed(String),

    #[error("Sharing mode '{0}' is not supported by this backend")]
    UnsupportedMode(SharingMode),

    #[error("No sharing configuration is applied")]
    NotApplied,

    #[error("Backend did not finish within {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type HostResult<T> = Result<T, HostError>;

/// Errors from interface enumeration
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("Interface inventory unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type InventoryResult<T> = Result<T, InventoryError>;

/// Applies and reverts sharing configurations on the host.
///
/// Implementations hold whatever they need to undo their last `apply`; the
/// engine guarantees `apply` and `revert` are never called concurrently.
#[async_trait]
pub trait ShareBackend: Send + Sync {
    /// What this backend can do
    fn capabilities(&self) -> &BackendCapabilities;

    /// Configure the host for sharing. On error the backend leaves the host
    /// as close to its prior state as it can.
    async fn apply(&self, config: &SharingConfig) -> HostResult<()>;

    /// Undo the last successful `apply`
    async fn revert(&self) -> HostResult<()>;

    /// Problems that would keep `apply` from working; empty when ready
    fn diagnostics(&self) -> Vec<String> {
        Vec::new()
    }

    /// Whether the backend's host tooling is usable
    fn is_healthy(&self) -> bool {
        self.diagnostics().is_empty()
    }
}

/// Read-only view of the host's network interfaces
pub trait InterfaceInventory: Send + Sync {
    /// Fresh snapshot of the visible interfaces
    fn list(&self) -> InventoryResult<Vec<Interface>>;
}
