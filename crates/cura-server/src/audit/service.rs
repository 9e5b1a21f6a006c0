//! Temporal query service
//!
//! Composes snapshot sequences from a [`SnapshotStore`] into the answers the
//! audit API needs, and owns the write path that turns entity changes into
//! snapshots stamped by the [`CommitClock`].

use super::clock::CommitClock;
use super::context::QueryContext;
use super::diff::{changed_properties, relation_delta, ChangeSet, RelationDelta};
use super::error::{AuditError, AuditResult};
use super::models::{ChangeKind, Commit, CommitId, EntityChange, EntityState, Snapshot, SnapshotType};
use super::store::SnapshotStore;
use chrono::{DateTime, Utc};
use cura_common::types::{AuditEntity, InstanceId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

// ============================================================================
// Query Types
// ============================================================================

/// How strictly "gained a relation" is tested
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GainMode {
    /// The target was added by the change itself: the immediate predecessor
    /// did not reference it
    #[default]
    Added,
    /// The relation changed and now references the target
    Present,
}

/// Which entities gained a reference to `target` since a point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationGainQuery {
    pub entity_type: AuditEntity,
    pub relation_property: String,
    pub target: InstanceId,
    pub since: DateTime<Utc>,
    pub display_property: String,
    pub mode: GainMode,
}

/// A snapshot, its predecessor and what changed between them
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSummary {
    pub snapshot: Snapshot,
    pub previous: Option<Snapshot>,
    pub changed: ChangeSet,
    /// One entry per changed relation property
    pub relations: Vec<RelationDelta>,
}

// ============================================================================
// Service
// ============================================================================

pub struct AuditService {
    store: Arc<dyn SnapshotStore>,
    clock: CommitClock,
    writer: Mutex<()>,
}

impl std::fmt::Debug for AuditService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditService")
            .field("store", &self.store.backend())
            .field("clock", &self.clock)
            .finish()
    }
}

impl AuditService {
    pub fn new(store: Arc<dyn SnapshotStore>, clock: CommitClock) -> Self {
        Self {
            store,
            clock,
            writer: Mutex::new(()),
        }
    }

    /// Build a service whose clock continues after the store's newest commit
    pub async fn resume(store: Arc<dyn SnapshotStore>) -> AuditResult<Self> {
        let last = store.last_commit().await?;
        if let Some(ref commit) = last {
            tracing::info!(commit = %commit.id, at = %commit.timestamp, "Resuming commit clock");
        }
        let clock = CommitClock::new().resume_from(last.as_ref());
        Ok(Self::new(store, clock))
    }

    pub fn store(&self) -> &Arc<dyn SnapshotStore> {
        &self.store
    }

    /// Up to `limit` most recent snapshots of a type, newest first
    #[tracing::instrument(skip(self, ctx), fields(entity_type = %entity_type))]
    pub async fn recent_changes(
        &self,
        ctx: &QueryContext,
        entity_type: AuditEntity,
        limit: i64,
    ) -> AuditResult<Vec<Snapshot>> {
        let snapshots = ctx
            .run(async { Ok(self.store.find_by_type(entity_type, limit).await?) })
            .await?;

        tracing::debug!(count = snapshots.len(), "Fetched recent changes");
        Ok(snapshots)
    }

    /// The snapshot of `instance` immediately before the one written by `commit`
    ///
    /// `Ok(None)` means the commit created the instance's first snapshot.
    /// A commit that wrote no snapshot of `instance` is an
    /// [`AuditError::UnknownCommit`].
    #[tracing::instrument(skip(self, ctx), fields(instance = %instance, commit = %commit))]
    pub async fn previous_version(
        &self,
        ctx: &QueryContext,
        instance: &InstanceId,
        commit: CommitId,
    ) -> AuditResult<Option<Snapshot>> {
        ctx.run(async {
            let target = self.probe(instance, commit).await?;
            Ok(self.predecessor_of(&target).await?)
        })
        .await
    }

    /// Display keys of entities whose relation gained `query.target`
    ///
    /// Keys are de-duplicated in first-seen order, newest change first.
    #[tracing::instrument(
        skip(self, ctx, query),
        fields(
            entity_type = %query.entity_type,
            relation = %query.relation_property,
            target = %query.target,
            since = %query.since,
            mode = ?query.mode
        )
    )]
    pub async fn entities_gaining_relation(
        &self,
        ctx: &QueryContext,
        query: &RelationGainQuery,
    ) -> AuditResult<Vec<String>> {
        ctx.run(async {
            let candidates = self
                .store
                .find_by_type_changed_since(query.entity_type, &query.relation_property, query.since)
                .await?;

            let mut seen = HashSet::new();
            let mut keys = Vec::new();

            for snapshot in &candidates {
                ctx.check()?;

                if !snapshot
                    .state
                    .relation_contains(&query.relation_property, &query.target)
                {
                    continue;
                }

                if query.mode == GainMode::Added {
                    let previous = self.predecessor_of(snapshot).await?;
                    let already_present = previous.is_some_and(|p| {
                        p.state.relation_contains(&query.relation_property, &query.target)
                    });
                    if already_present {
                        continue;
                    }
                }

                let Some(key) = snapshot
                    .state
                    .get(&query.display_property)
                    .and_then(|value| value.as_display_key())
                else {
                    continue;
                };

                if seen.insert(key.clone()) {
                    keys.push(key);
                }
            }

            tracing::debug!(
                candidates = candidates.len(),
                matched = keys.len(),
                "Relation gain scan finished"
            );
            Ok(keys)
        })
        .await
    }

    /// What the snapshot written by `commit` changed on `instance`
    #[tracing::instrument(skip(self, ctx), fields(instance = %instance, commit = %commit))]
    pub async fn change_set(
        &self,
        ctx: &QueryContext,
        instance: &InstanceId,
        commit: CommitId,
    ) -> AuditResult<ChangeSummary> {
        ctx.run(async {
            let snapshot = self.probe(instance, commit).await?;
            let previous = self.predecessor_of(&snapshot).await?;
            let changed = changed_properties(&snapshot, previous.as_ref());

            let relations = changed
                .iter()
                .filter(|name| {
                    is_relation(&snapshot.state, name)
                        || previous.as_ref().is_some_and(|p| is_relation(&p.state, name))
                })
                .map(|name| relation_delta(&snapshot, previous.as_ref(), name))
                .collect();

            Ok(ChangeSummary {
                snapshot,
                previous,
                changed,
                relations,
            })
        })
        .await
    }

    /// Record one commit of entity changes
    ///
    /// Every change becomes one snapshot stamped with the same commit; they
    /// are appended atomically. Writes are serialized so that versions and
    /// lifecycle kinds are derived from a stable latest snapshot.
    #[tracing::instrument(skip(self, changes), fields(count = changes.len()))]
    pub async fn record(
        &self,
        author: Option<&str>,
        changes: Vec<EntityChange>,
    ) -> AuditResult<(Commit, Vec<Snapshot>)> {
        validate_changes(&changes)?;

        let _writer = self.writer.lock().await;

        let mut latest = Vec::with_capacity(changes.len());
        for change in &changes {
            latest.push(self.store.latest(&change.instance).await?);
        }

        let commit = self.clock.next_commit(author);
        let snapshots = changes
            .into_iter()
            .zip(latest)
            .map(|(change, previous)| next_snapshot(&commit, change, previous.as_ref()))
            .collect::<AuditResult<Vec<_>>>()?;

        self.store.append_batch(snapshots.clone()).await?;

        tracing::info!(
            commit = %commit.id,
            author = commit.author.as_deref().unwrap_or("-"),
            snapshots = snapshots.len(),
            "Recorded commit"
        );

        Ok((commit, snapshots))
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    /// Exact probe: the snapshot of `instance` at `commit`, or UnknownCommit
    async fn probe(&self, instance: &InstanceId, commit: CommitId) -> AuditResult<Snapshot> {
        self.store
            .find_by_instance_at_commit(instance, commit)
            .await?
            .ok_or_else(|| AuditError::UnknownCommit {
                instance: instance.clone(),
                commit,
            })
    }

    /// The two newest snapshots at or before `snapshot`; the second one is
    /// its predecessor
    async fn predecessor_of(&self, snapshot: &Snapshot) -> AuditResult<Option<Snapshot>> {
        let mut history = self
            .store
            .find_by_instance_at_or_before(&snapshot.instance, &snapshot.commit, 2)
            .await?;

        Ok(if history.len() == 2 { history.pop() } else { None })
    }
}

fn is_relation(state: &EntityState, property: &str) -> bool {
    state.get(property).and_then(|v| v.as_relation()).is_some()
}

fn validate_changes(changes: &[EntityChange]) -> AuditResult<()> {
    if changes.is_empty() {
        return Err(AuditError::InvalidChange("a commit needs at least one change".to_string()));
    }

    let mut instances = HashSet::new();
    for change in changes {
        if !instances.insert(&change.instance) {
            return Err(AuditError::InvalidChange(format!(
                "{} is changed more than once in one commit",
                change.instance
            )));
        }
    }
    Ok(())
}

fn next_snapshot(
    commit: &Commit,
    change: EntityChange,
    previous: Option<&Snapshot>,
) -> AuditResult<Snapshot> {
    let live = previous.filter(|p| p.kind != SnapshotType::Terminal);
    let version = previous.map_or(1, |p| p.version + 1);

    let (kind, state) = match change.kind {
        ChangeKind::Upsert { state } => {
            let kind = if live.is_some() {
                SnapshotType::Update
            } else {
                SnapshotType::Initial
            };
            (kind, state)
        },
        ChangeKind::Delete => {
            if live.is_none() {
                return Err(AuditError::InvalidChange(format!(
                    "{} has no live snapshot to delete",
                    change.instance
                )));
            }
            (SnapshotType::Terminal, EntityState::new())
        },
    };

    Ok(Snapshot {
        instance: change.instance,
        commit: commit.clone(),
        version,
        kind,
        state,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::models::PropertyValue;
    use crate::audit::store::InMemorySnapshotStore;
    use chrono::{Duration, TimeZone};

    fn gene(id: i64) -> InstanceId {
        InstanceId::new(AuditEntity::Gene, id)
    }

    fn flag(id: i64) -> InstanceId {
        InstanceId::new(AuditEntity::Flag, id)
    }

    fn gene_state(symbol: &str, flags: &[i64]) -> EntityState {
        EntityState::new()
            .with("hugoSymbol", PropertyValue::scalar(symbol))
            .with("flags", PropertyValue::relation(flags.iter().copied().map(flag)))
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
    }

    /// Service whose clock advances one hour per commit from `start()`
    fn service() -> AuditService {
        let ticks = Arc::new(std::sync::atomic::AtomicI64::new(0));
        let clock = CommitClock::with_time_source(Arc::new(move || {
            let n = ticks.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            start() + Duration::hours(n)
        }));
        AuditService::new(Arc::new(InMemorySnapshotStore::new()), clock)
    }

    async fn upsert(service: &AuditService, instance: InstanceId, state: EntityState) -> Commit {
        service
            .record(Some("curator"), vec![EntityChange::upsert(instance, state)])
            .await
            .unwrap()
            .0
    }

    fn ctx() -> QueryContext {
        QueryContext::background()
    }

    #[tokio::test]
    async fn test_record_assigns_versions_and_kinds() {
        let service = service();
        upsert(&service, gene(1), gene_state("BRAF", &[])).await;
        upsert(&service, gene(1), gene_state("BRAF", &[1])).await;
        let (_, deleted) = service
            .record(None, vec![EntityChange::delete(gene(1))])
            .await
            .unwrap();
        upsert(&service, gene(1), gene_state("BRAF", &[])).await;

        let history = service.recent_changes(&ctx(), AuditEntity::Gene, 10).await.unwrap();
        let kinds: Vec<_> = history.iter().map(|s| (s.version, s.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                (4, SnapshotType::Initial),
                (3, SnapshotType::Terminal),
                (2, SnapshotType::Update),
                (1, SnapshotType::Initial),
            ]
        );
        assert!(deleted[0].state.is_empty());
    }

    #[tokio::test]
    async fn test_record_rejects_invalid_changes() {
        let service = service();

        let empty = service.record(None, vec![]).await;
        assert!(matches!(empty, Err(AuditError::InvalidChange(_))));

        let duplicate = service
            .record(
                None,
                vec![
                    EntityChange::upsert(gene(1), EntityState::new()),
                    EntityChange::delete(gene(1)),
                ],
            )
            .await;
        assert!(matches!(duplicate, Err(AuditError::InvalidChange(_))));

        let phantom_delete = service.record(None, vec![EntityChange::delete(gene(9))]).await;
        assert!(matches!(phantom_delete, Err(AuditError::InvalidChange(_))));

        assert!(service.store().last_commit().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_recent_changes_non_positive_limit_is_empty() {
        let service = service();
        upsert(&service, gene(1), gene_state("BRAF", &[])).await;

        assert!(service.recent_changes(&ctx(), AuditEntity::Gene, 0).await.unwrap().is_empty());
        assert!(service.recent_changes(&ctx(), AuditEntity::Gene, -5).await.unwrap().is_empty());
        assert_eq!(
            service.recent_changes(&ctx(), AuditEntity::Gene, 1).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_previous_version() {
        let service = service();
        let c1 = upsert(&service, gene(1), gene_state("BRAF", &[])).await;
        let c2 = upsert(&service, gene(1), gene_state("BRAF", &[1])).await;
        let _c3 = upsert(&service, gene(1), gene_state("BRAF", &[1, 2])).await;
        let other = upsert(&service, gene(2), gene_state("KRAS", &[])).await;

        let previous = service.previous_version(&ctx(), &gene(1), c2.id).await.unwrap();
        assert_eq!(previous.map(|s| s.commit.id), Some(c1.id));

        let first = service.previous_version(&ctx(), &gene(1), c1.id).await.unwrap();
        assert!(first.is_none());

        let unknown = service.previous_version(&ctx(), &gene(1), other.id).await;
        assert!(matches!(unknown, Err(AuditError::UnknownCommit { .. })));
    }

    #[tokio::test]
    async fn test_gaining_relation_distinguishes_new_from_existing() {
        let service = service();
        // KRAS carries the flag before the window and never changes
        upsert(&service, gene(2), gene_state("KRAS", &[1])).await;
        upsert(&service, gene(1), gene_state("BRAF", &[])).await;
        let since = service.store().last_commit().await.unwrap().unwrap().timestamp
            + Duration::minutes(1);
        upsert(&service, gene(1), gene_state("BRAF", &[1])).await;

        let query = RelationGainQuery {
            entity_type: AuditEntity::Gene,
            relation_property: "flags".to_string(),
            target: flag(1),
            since,
            display_property: "hugoSymbol".to_string(),
            mode: GainMode::Added,
        };
        let keys = service.entities_gaining_relation(&ctx(), &query).await.unwrap();
        assert_eq!(keys, vec!["BRAF".to_string()]);
    }

    #[tokio::test]
    async fn test_gaining_relation_deduplicates_keys() {
        let service = service();
        upsert(&service, gene(1), gene_state("BRAF", &[1])).await;
        upsert(&service, gene(1), gene_state("BRAF", &[1, 2])).await;
        upsert(&service, gene(1), gene_state("BRAF", &[1, 3])).await;

        let query = RelationGainQuery {
            entity_type: AuditEntity::Gene,
            relation_property: "flags".to_string(),
            target: flag(1),
            since: start(),
            display_property: "hugoSymbol".to_string(),
            mode: GainMode::Present,
        };
        let keys = service.entities_gaining_relation(&ctx(), &query).await.unwrap();
        assert_eq!(keys, vec!["BRAF".to_string()]);
    }

    #[tokio::test]
    async fn test_added_mode_ignores_churn_on_existing_member() {
        let service = service();
        upsert(&service, gene(1), gene_state("BRAF", &[1])).await;
        let since = start() + Duration::minutes(30);
        // flags change, but flag 1 was already there
        upsert(&service, gene(1), gene_state("BRAF", &[1, 2])).await;

        let mut query = RelationGainQuery {
            entity_type: AuditEntity::Gene,
            relation_property: "flags".to_string(),
            target: flag(1),
            since,
            display_property: "hugoSymbol".to_string(),
            mode: GainMode::Added,
        };
        assert!(service.entities_gaining_relation(&ctx(), &query).await.unwrap().is_empty());

        query.mode = GainMode::Present;
        assert_eq!(
            service.entities_gaining_relation(&ctx(), &query).await.unwrap(),
            vec!["BRAF".to_string()]
        );
    }

    #[tokio::test]
    async fn test_gaining_relation_skips_missing_display_keys() {
        let service = service();
        upsert(
            &service,
            gene(1),
            EntityState::new().with("flags", PropertyValue::relation([flag(1)])),
        )
        .await;

        let query = RelationGainQuery {
            entity_type: AuditEntity::Gene,
            relation_property: "flags".to_string(),
            target: flag(1),
            since: start(),
            display_property: "hugoSymbol".to_string(),
            mode: GainMode::Added,
        };
        assert!(service.entities_gaining_relation(&ctx(), &query).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_identical_rewrite_has_empty_change_set() {
        let service = service();
        upsert(&service, gene(1), gene_state("BRAF", &[1])).await;
        let again = upsert(&service, gene(1), gene_state("BRAF", &[1])).await;

        let history = service.recent_changes(&ctx(), AuditEntity::Gene, 10).await.unwrap();
        assert_eq!(history.len(), 2);

        let summary = service.change_set(&ctx(), &gene(1), again.id).await.unwrap();
        assert!(summary.changed.is_empty());
        assert!(summary.relations.is_empty());
    }

    #[tokio::test]
    async fn test_change_set_reports_relation_deltas() {
        let service = service();
        upsert(&service, gene(1), gene_state("BRAF", &[1, 2])).await;
        let c2 = upsert(&service, gene(1), gene_state("BRAF1", &[2, 3])).await;

        let summary = service.change_set(&ctx(), &gene(1), c2.id).await.unwrap();
        assert_eq!(
            summary.changed,
            ChangeSet::from(["flags".to_string(), "hugoSymbol".to_string()])
        );
        assert_eq!(summary.relations.len(), 1);
        assert_eq!(summary.relations[0].added.len(), 1);
        assert!(summary.relations[0].added.contains(&flag(3)));
        assert!(summary.relations[0].removed.contains(&flag(1)));
        assert_eq!(summary.previous.map(|p| p.version), Some(1));
    }

    #[tokio::test]
    async fn test_cancelled_query_fails() {
        let service = service();
        let ctx = QueryContext::background();
        ctx.cancel();

        let result = service.recent_changes(&ctx, AuditEntity::Gene, 5).await;
        assert!(matches!(result, Err(AuditError::Cancelled)));
    }

    #[tokio::test]
    async fn test_resume_continues_clock() {
        let store: Arc<dyn SnapshotStore> = Arc::new(InMemorySnapshotStore::new());
        let first = AuditService::new(store.clone(), CommitClock::new());
        let (c1, _) = first
            .record(None, vec![EntityChange::upsert(gene(1), EntityState::new())])
            .await
            .unwrap();

        let resumed = AuditService::resume(store).await.unwrap();
        let (c2, _) = resumed
            .record(None, vec![EntityChange::upsert(gene(1), EntityState::new())])
            .await
            .unwrap();

        assert!(c2.id > c1.id);
        assert!(c2.timestamp > c1.timestamp);
    }
}
