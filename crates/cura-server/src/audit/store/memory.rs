//! In-memory snapshot store
//!
//! An append-only vector behind a `tokio::sync::RwLock`. Per-type and
//! per-instance index vectors are kept sorted by commit position, and every
//! entry records the index of its predecessor, so the changed-since scan
//! never has to search for it.

use super::{effective_limit, SnapshotStore, StoreResult};
use crate::audit::diff::property_changed;
use crate::audit::error::StoreError;
use crate::audit::models::{Commit, CommitId, Snapshot};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cura_common::types::{AuditEntity, InstanceId};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug)]
struct Entry {
    snapshot: Snapshot,
    predecessor: Option<usize>,
}

#[derive(Debug, Default)]
struct Log {
    entries: Vec<Entry>,
    /// Oldest first by commit position
    by_type: HashMap<AuditEntity, Vec<usize>>,
    /// Oldest first; appends always land at the end
    by_instance: HashMap<InstanceId, Vec<usize>>,
    last_commit: Option<Commit>,
}

impl Log {
    fn latest_index(&self, instance: &InstanceId) -> Option<usize> {
        self.by_instance.get(instance).and_then(|ids| ids.last().copied())
    }

    fn push(&mut self, snapshot: Snapshot) {
        let index = self.entries.len();
        let predecessor = self.latest_index(&snapshot.instance);
        let position = snapshot.commit.position();

        let entries = &self.entries;
        let of_type = self.by_type.entry(snapshot.instance.entity_type).or_default();
        let at = of_type.partition_point(|&i| entries[i].snapshot.commit.position() <= position);
        of_type.insert(at, index);

        self.by_instance
            .entry(snapshot.instance.clone())
            .or_default()
            .push(index);

        if self
            .last_commit
            .as_ref()
            .map_or(true, |last| last.position() < position)
        {
            self.last_commit = Some(snapshot.commit.clone());
        }

        self.entries.push(Entry {
            snapshot,
            predecessor,
        });
    }

    fn newest_of_instance(&self, instance: &InstanceId) -> impl Iterator<Item = &Snapshot> {
        self.by_instance
            .get(instance)
            .into_iter()
            .flat_map(|ids| ids.iter().rev())
            .map(move |&i| &self.entries[i].snapshot)
    }
}

#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    log: RwLock<Log>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.log.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn ensure_follows(latest: Option<&Commit>, snapshot: &Snapshot) -> StoreResult<()> {
    match latest {
        Some(latest) if snapshot.commit.position() <= latest.position() => {
            Err(StoreError::OutOfOrder {
                instance: snapshot.instance.clone(),
                commit: snapshot.commit.id,
            })
        },
        _ => Ok(()),
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn append(&self, snapshot: Snapshot) -> StoreResult<()> {
        let mut log = self.log.write().await;
        let latest = log
            .latest_index(&snapshot.instance)
            .map(|i| &log.entries[i].snapshot.commit);
        ensure_follows(latest, &snapshot)?;

        log.push(snapshot);
        Ok(())
    }

    async fn append_batch(&self, snapshots: Vec<Snapshot>) -> StoreResult<()> {
        let mut log = self.log.write().await;

        // Validate the whole batch before anything becomes visible
        let mut pending: HashMap<&InstanceId, &Commit> = HashMap::new();
        for snapshot in &snapshots {
            let latest = match pending.get(&snapshot.instance) {
                Some(commit) => Some(*commit),
                None => log
                    .latest_index(&snapshot.instance)
                    .map(|i| &log.entries[i].snapshot.commit),
            };
            ensure_follows(latest, snapshot)?;
            pending.insert(&snapshot.instance, &snapshot.commit);
        }
        drop(pending);

        for snapshot in snapshots {
            log.push(snapshot);
        }
        Ok(())
    }

    async fn find_by_type(&self, entity_type: AuditEntity, limit: i64) -> StoreResult<Vec<Snapshot>> {
        let Some(limit) = effective_limit(limit) else {
            return Ok(Vec::new());
        };

        let log = self.log.read().await;
        Ok(log
            .by_type
            .get(&entity_type)
            .into_iter()
            .flat_map(|ids| ids.iter().rev())
            .take(limit)
            .map(|&i| log.entries[i].snapshot.clone())
            .collect())
    }

    async fn find_by_instance_at_commit(
        &self,
        instance: &InstanceId,
        commit: CommitId,
    ) -> StoreResult<Option<Snapshot>> {
        let log = self.log.read().await;
        let snapshot = log
            .newest_of_instance(instance)
            .find(|snapshot| snapshot.commit.id == commit)
            .cloned();
        Ok(snapshot)
    }

    async fn find_by_instance_at_or_before(
        &self,
        instance: &InstanceId,
        bound: &Commit,
        limit: i64,
    ) -> StoreResult<Vec<Snapshot>> {
        let Some(limit) = effective_limit(limit) else {
            return Ok(Vec::new());
        };

        let bound = bound.position();
        let log = self.log.read().await;
        Ok(log
            .newest_of_instance(instance)
            .skip_while(|snapshot| snapshot.commit.position() > bound)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn find_by_type_changed_since(
        &self,
        entity_type: AuditEntity,
        property: &str,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<Snapshot>> {
        let log = self.log.read().await;
        let Some(ids) = log.by_type.get(&entity_type) else {
            return Ok(Vec::new());
        };

        Ok(ids
            .iter()
            .rev()
            .map(|&i| &log.entries[i])
            .take_while(|entry| entry.snapshot.commit.timestamp >= since)
            .filter(|entry| {
                let previous = entry.predecessor.map(|p| &log.entries[p].snapshot);
                property_changed(&entry.snapshot, previous, property)
            })
            .map(|entry| entry.snapshot.clone())
            .collect())
    }

    async fn latest(&self, instance: &InstanceId) -> StoreResult<Option<Snapshot>> {
        let log = self.log.read().await;
        let snapshot = log.newest_of_instance(instance).next().cloned();
        Ok(snapshot)
    }

    async fn last_commit(&self) -> StoreResult<Option<Commit>> {
        Ok(self.log.read().await.last_commit.clone())
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }
}
