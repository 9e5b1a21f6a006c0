use crate::audit::{Commit, Snapshot};
use chrono::{DateTime, Utc};
use cura_common::types::{AuditEntity, PrimaryKey};
use serde::{Deserialize, Serialize};

/// Who committed what and when
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitMetadata {
    pub id: u64,
    pub author: Option<String>,
    pub commit_date: DateTime<Utc>,
}

impl From<&Commit> for CommitMetadata {
    fn from(commit: &Commit) -> Self {
        Self {
            id: commit.id.0,
            author: commit.author.clone(),
            commit_date: commit.timestamp,
        }
    }
}

/// One snapshot rendered for the audit API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityAuditEvent {
    /// Commit id of the snapshot
    pub id: u64,
    pub entity_id: PrimaryKey,
    pub entity_type: AuditEntity,
    /// CREATE, UPDATE or DELETE
    pub action: String,
    pub commit_version: u64,
    pub commit_metadata: CommitMetadata,
    pub entity_value: serde_json::Value,
}

impl From<&Snapshot> for EntityAuditEvent {
    fn from(snapshot: &Snapshot) -> Self {
        Self {
            id: snapshot.commit.id.0,
            entity_id: snapshot.instance.id.clone(),
            entity_type: snapshot.instance.entity_type,
            action: snapshot.kind.action().to_string(),
            commit_version: snapshot.version,
            commit_metadata: CommitMetadata::from(&snapshot.commit),
            entity_value: snapshot.state.to_json(),
        }
    }
}
