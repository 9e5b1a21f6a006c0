//! Snapshot storage
//!
//! The store owns the append-only snapshot log. Every read returns snapshots
//! newest first, ordered by `(commit timestamp DESC, commit id DESC)`, and a
//! non-positive `limit` yields an empty result.

mod memory;
mod postgres;

pub use memory::InMemorySnapshotStore;
pub use postgres::PgSnapshotStore;

use super::error::StoreError;
use super::models::{Commit, CommitId, Snapshot};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cura_common::types::{AuditEntity, InstanceId};

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Short backend name for health reporting
    fn backend(&self) -> &'static str;

    /// Append one snapshot
    ///
    /// Fails with [`StoreError::OutOfOrder`] unless the snapshot's commit is
    /// strictly after the instance's latest snapshot.
    async fn append(&self, snapshot: Snapshot) -> StoreResult<()>;

    /// Append the snapshots of one commit; either all become visible or none
    async fn append_batch(&self, snapshots: Vec<Snapshot>) -> StoreResult<()>;

    /// Most recent snapshots of a type
    async fn find_by_type(&self, entity_type: AuditEntity, limit: i64) -> StoreResult<Vec<Snapshot>>;

    /// The snapshot of `instance` written by exactly `commit`
    async fn find_by_instance_at_commit(
        &self,
        instance: &InstanceId,
        commit: CommitId,
    ) -> StoreResult<Option<Snapshot>>;

    /// Snapshots of `instance` at or before `bound`
    async fn find_by_instance_at_or_before(
        &self,
        instance: &InstanceId,
        bound: &Commit,
        limit: i64,
    ) -> StoreResult<Vec<Snapshot>>;

    /// Snapshots of a type committed at or after `since` whose change set
    /// against their own predecessor contains `property`
    async fn find_by_type_changed_since(
        &self,
        entity_type: AuditEntity,
        property: &str,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<Snapshot>>;

    /// Current snapshot of an instance
    async fn latest(&self, instance: &InstanceId) -> StoreResult<Option<Snapshot>>;

    /// Newest commit in the whole log
    async fn last_commit(&self) -> StoreResult<Option<Commit>>;

    async fn health_check(&self) -> StoreResult<()>;
}

/// Clamp a caller-supplied limit to a usable size
pub(crate) fn effective_limit(limit: i64) -> Option<usize> {
    (limit > 0).then(|| usize::try_from(limit).unwrap_or(usize::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_limit() {
        assert_eq!(effective_limit(0), None);
        assert_eq!(effective_limit(-3), None);
        assert_eq!(effective_limit(5), Some(5));
    }
}
