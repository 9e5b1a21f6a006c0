//! Error types of the audit engine

use super::models::CommitId;
use cura_common::types::InstanceId;
use cura_common::CuraError;

/// Failures of a snapshot store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// The snapshot would not advance its instance's history
    #[error("Snapshot of {instance} at commit {commit} does not follow the latest snapshot")]
    OutOfOrder { instance: InstanceId, commit: CommitId },

    /// A stored row could not be decoded back into a snapshot
    #[error("Corrupt snapshot row: {0}")]
    Corrupt(String),
}

impl From<CuraError> for StoreError {
    fn from(err: CuraError) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

/// Failures of the temporal query service and the write path
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("Unknown entity type: {0}")]
    UnknownEntityType(String),

    /// The commit does not correspond to any snapshot of the instance
    #[error("No snapshot of {instance} at commit {commit}")]
    UnknownCommit { instance: InstanceId, commit: CommitId },

    #[error("Invalid change: {0}")]
    InvalidChange(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Query cancelled")]
    Cancelled,

    #[error("Query timed out")]
    Timeout,
}

impl AuditError {
    /// Whether the caller supplied bad input
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AuditError::UnknownEntityType(_)
                | AuditError::UnknownCommit { .. }
                | AuditError::InvalidChange(_)
        )
    }
}

impl From<CuraError> for AuditError {
    fn from(err: CuraError) -> Self {
        match err {
            CuraError::UnknownEntityType(name) => AuditError::UnknownEntityType(name),
            other => AuditError::InvalidChange(other.to_string()),
        }
    }
}

pub type AuditResult<T> = std::result::Result<T, AuditError>;
