//! Store trait definitions

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tether_api::SharingConfig;
use tether_util::ProfileName;

use crate::{AuditEvent, StoreResult};

/// A stored, named sharing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub name: ProfileName,
    pub config: SharingConfig,
    pub created_at: DateTime<Local>,
    pub updated_at: DateTime<Local>,
}

/// Main store trait
pub trait Store: Send + Sync {
    // Profiles

    /// Names of all stored profiles, in byte order
    fn list_profiles(&self) -> StoreResult<Vec<ProfileName>>;

    /// Insert or overwrite a profile
    fn save_profile(&self, name: &ProfileName, config: &SharingConfig) -> StoreResult<Profile>;

    /// Look up a profile by exact name
    fn get_profile(&self, name: &ProfileName) -> StoreResult<Profile>;

    /// Remove a profile
    fn delete_profile(&self, name: &ProfileName) -> StoreResult<()>;

    // Audit log

    /// Append an audit event
    fn append_audit(&self, event: AuditEvent) -> StoreResult<()>;

    /// Get recent audit events, newest first
    fn recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>>;

    // Health

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}
