//! Record commit command
//!
//! The write path of the audit engine. The owning persistence layer posts
//! every entity mutation of one transaction as a single commit; each change
//! becomes a snapshot stamped with the same commit id and timestamp.

use crate::audit::{AuditError, AuditService, EntityChange};
use crate::features::audits::types::{CommitMetadata, EntityAuditEvent};
use serde::{Deserialize, Serialize};

const MAX_AUTHOR_LENGTH: usize = 255;

/// Command to record one commit
///
/// ```json
/// {
///   "author": "curator@oncokb.org",
///   "changes": [
///     {
///       "instance": { "entityType": "Gene", "id": 673 },
///       "action": "UPSERT",
///       "state": { "hugoSymbol": "BRAF", "flags": [{ "entityType": "Flag", "id": 1 }] }
///     },
///     { "instance": { "entityType": "Alteration", "id": 9 }, "action": "DELETE" }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordCommitCommand {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub changes: Vec<EntityChange>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordCommitResponse {
    pub commit: CommitMetadata,
    pub snapshots: Vec<EntityAuditEvent>,
}

#[derive(Debug, thiserror::Error)]
pub enum RecordCommitError {
    #[error("A commit needs at least one change")]
    NoChanges,
    #[error("Author must be at most 255 characters")]
    AuthorLength,
    #[error(transparent)]
    Audit(#[from] AuditError),
}

impl RecordCommitCommand {
    pub fn validate(&self) -> Result<(), RecordCommitError> {
        if self.changes.is_empty() {
            return Err(RecordCommitError::NoChanges);
        }
        if self
            .author
            .as_deref()
            .is_some_and(|a| a.chars().count() > MAX_AUTHOR_LENGTH)
        {
            return Err(RecordCommitError::AuthorLength);
        }
        Ok(())
    }

    fn author(&self) -> Option<&str> {
        self.author.as_deref().map(str::trim).filter(|a| !a.is_empty())
    }
}

#[tracing::instrument(skip(service, command), fields(changes = command.changes.len()))]
pub async fn handle(
    service: &AuditService,
    command: RecordCommitCommand,
) -> Result<RecordCommitResponse, RecordCommitError> {
    command.validate()?;

    let author = command.author().map(str::to_string);
    let (commit, snapshots) = service.record(author.as_deref(), command.changes).await?;

    Ok(RecordCommitResponse {
        commit: CommitMetadata::from(&commit),
        snapshots: snapshots.iter().map(EntityAuditEvent::from).collect(),
    })
}
