//! Session engine errors

use tether_api::SessionPhase;
use tether_host_api::HostError;
use thiserror::Error;

use crate::ValidationIssue;

#[derive(Debug, Error)]
pub enum SessionError {
    /// The config was rejected; host state is untouched
    #[error("Invalid sharing config: {}", join_issues(.0))]
    Validation(Vec<ValidationIssue>),

    /// The request does not fit the current phase; nothing changed
    #[error("Session is {phase}")]
    Conflict { phase: SessionPhase },

    /// The backend failed. Host state is unknown; re-query the snapshot.
    #[error("Backend error: {0}")]
    Apply(#[from] HostError),
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type SessionResult<T> = Result<T, SessionError>;
