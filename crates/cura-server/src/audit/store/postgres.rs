//! PostgreSQL snapshot store over the `audit_snapshots` table

use super::{effective_limit, SnapshotStore, StoreResult};
use crate::audit::error::StoreError;
use crate::audit::models::{Commit, CommitId, EntityState, Snapshot};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cura_common::types::{AuditEntity, InstanceId, PrimaryKey};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};

const SNAPSHOT_COLUMNS: &str =
    "commit_id, committed_at, author, entity_type, primary_key, version, snapshot_type, state";

/// Inserts the row only if it advances the instance's history
const INSERT_SNAPSHOT: &str = r#"
    INSERT INTO audit_snapshots
        (commit_id, committed_at, author, entity_type, primary_key, version, snapshot_type, state)
    SELECT $1::BIGINT, $2::TIMESTAMPTZ, $3::TEXT, $4::TEXT, $5::JSONB, $6::BIGINT, $7::TEXT, $8::JSONB
    WHERE NOT EXISTS (
        SELECT 1 FROM audit_snapshots
        WHERE entity_type = $4 AND primary_key = $5
          AND (committed_at, commit_id) >= ($2, $1)
    )
    "#;

#[derive(Debug, Clone)]
pub struct PgSnapshotStore {
    pool: PgPool,
}

impl PgSnapshotStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply pending schema migrations
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn insert(tx: &mut Transaction<'_, Postgres>, snapshot: &Snapshot) -> StoreResult<()> {
        let result = sqlx::query(INSERT_SNAPSHOT)
            .bind(commit_id_to_db(snapshot.commit.id)?)
            .bind(snapshot.commit.timestamp)
            .bind(snapshot.commit.author.as_deref())
            .bind(snapshot.instance.entity_type.as_str())
            .bind(Json(&snapshot.instance.id))
            .bind(i64::try_from(snapshot.version).map_err(|e| StoreError::Corrupt(e.to_string()))?)
            .bind(snapshot.kind.as_str())
            .bind(Json(&snapshot.state))
            .execute(&mut **tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::OutOfOrder {
                instance: snapshot.instance.clone(),
                commit: snapshot.commit.id,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for PgSnapshotStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    #[tracing::instrument(skip(self, snapshot), fields(instance = %snapshot.instance, commit = %snapshot.commit.id))]
    async fn append(&self, snapshot: Snapshot) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        Self::insert(&mut tx, &snapshot).await?;
        tx.commit().await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, snapshots), fields(count = snapshots.len()))]
    async fn append_batch(&self, snapshots: Vec<Snapshot>) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        for snapshot in &snapshots {
            // Dropping the transaction on error rolls the whole batch back
            Self::insert(&mut tx, snapshot).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn find_by_type(&self, entity_type: AuditEntity, limit: i64) -> StoreResult<Vec<Snapshot>> {
        if effective_limit(limit).is_none() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM audit_snapshots
             WHERE entity_type = $1
             ORDER BY committed_at DESC, commit_id DESC
             LIMIT $2"
        );
        let rows: Vec<SnapshotRow> = sqlx::query_as(&sql)
            .bind(entity_type.as_str())
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Snapshot::try_from).collect()
    }

    async fn find_by_instance_at_commit(
        &self,
        instance: &InstanceId,
        commit: CommitId,
    ) -> StoreResult<Option<Snapshot>> {
        let sql = format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM audit_snapshots
             WHERE entity_type = $1 AND primary_key = $2 AND commit_id = $3
             LIMIT 1"
        );
        let row: Option<SnapshotRow> = sqlx::query_as(&sql)
            .bind(instance.entity_type.as_str())
            .bind(Json(&instance.id))
            .bind(commit_id_to_db(commit)?)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Snapshot::try_from).transpose()
    }

    async fn find_by_instance_at_or_before(
        &self,
        instance: &InstanceId,
        bound: &Commit,
        limit: i64,
    ) -> StoreResult<Vec<Snapshot>> {
        if effective_limit(limit).is_none() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM audit_snapshots
             WHERE entity_type = $1 AND primary_key = $2
               AND (committed_at, commit_id) <= ($3, $4)
             ORDER BY committed_at DESC, commit_id DESC
             LIMIT $5"
        );
        let rows: Vec<SnapshotRow> = sqlx::query_as(&sql)
            .bind(instance.entity_type.as_str())
            .bind(Json(&instance.id))
            .bind(bound.timestamp)
            .bind(commit_id_to_db(bound.id)?)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Snapshot::try_from).collect()
    }

    #[tracing::instrument(skip(self))]
    async fn find_by_type_changed_since(
        &self,
        entity_type: AuditEntity,
        property: &str,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<Snapshot>> {
        // LAG over the full history of each instance yields the predecessor
        // state even when it was committed before `since`. A missing
        // predecessor or property is NULL, so first snapshots count as
        // changed exactly when they carry the property.
        let sql = format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM (
                 SELECT {SNAPSHOT_COLUMNS},
                        LAG(state) OVER (
                            PARTITION BY primary_key
                            ORDER BY committed_at, commit_id
                        ) AS previous_state
                 FROM audit_snapshots
                 WHERE entity_type = $1
             ) history
             WHERE committed_at >= $2
               AND (previous_state -> $3::TEXT) IS DISTINCT FROM (state -> $3::TEXT)
             ORDER BY committed_at DESC, commit_id DESC"
        );
        let rows: Vec<SnapshotRow> = sqlx::query_as(&sql)
            .bind(entity_type.as_str())
            .bind(since)
            .bind(property)
            .fetch_all(&self.pool)
            .await?;

        tracing::debug!(count = rows.len(), "Changed-since scan finished");

        rows.into_iter().map(Snapshot::try_from).collect()
    }

    async fn latest(&self, instance: &InstanceId) -> StoreResult<Option<Snapshot>> {
        let sql = format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM audit_snapshots
             WHERE entity_type = $1 AND primary_key = $2
             ORDER BY committed_at DESC, commit_id DESC
             LIMIT 1"
        );
        let row: Option<SnapshotRow> = sqlx::query_as(&sql)
            .bind(instance.entity_type.as_str())
            .bind(Json(&instance.id))
            .fetch_optional(&self.pool)
            .await?;

        row.map(Snapshot::try_from).transpose()
    }

    async fn last_commit(&self) -> StoreResult<Option<Commit>> {
        let row: Option<CommitRow> = sqlx::query_as(
            "SELECT commit_id, committed_at, author FROM audit_snapshots
             ORDER BY committed_at DESC, commit_id DESC
             LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        row.map(Commit::try_from).transpose()
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// ============================================================================
// Row Mapping
// ============================================================================

fn commit_id_to_db(id: CommitId) -> StoreResult<i64> {
    i64::try_from(id.0).map_err(|_| StoreError::Corrupt(format!("commit id {} out of range", id)))
}

fn commit_id_from_db(id: i64) -> StoreResult<CommitId> {
    u64::try_from(id)
        .map(CommitId)
        .map_err(|_| StoreError::Corrupt(format!("negative commit id {}", id)))
}

#[derive(Debug, sqlx::FromRow)]
struct CommitRow {
    commit_id: i64,
    committed_at: DateTime<Utc>,
    author: Option<String>,
}

impl TryFrom<CommitRow> for Commit {
    type Error = StoreError;

    fn try_from(row: CommitRow) -> Result<Self, Self::Error> {
        Ok(Commit {
            id: commit_id_from_db(row.commit_id)?,
            timestamp: row.committed_at,
            author: row.author,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SnapshotRow {
    commit_id: i64,
    committed_at: DateTime<Utc>,
    author: Option<String>,
    entity_type: String,
    primary_key: Json<PrimaryKey>,
    version: i64,
    snapshot_type: String,
    state: Json<EntityState>,
}

impl TryFrom<SnapshotRow> for Snapshot {
    type Error = StoreError;

    fn try_from(row: SnapshotRow) -> Result<Self, Self::Error> {
        Ok(Snapshot {
            instance: InstanceId::new(row.entity_type.parse()?, row.primary_key.0),
            commit: Commit {
                id: commit_id_from_db(row.commit_id)?,
                timestamp: row.committed_at,
                author: row.author,
            },
            version: u64::try_from(row.version)
                .map_err(|_| StoreError::Corrupt(format!("invalid version {}", row.version)))?,
            kind: row.snapshot_type.parse().map_err(StoreError::Corrupt)?,
            state: row.state.0,
        })
    }
}
