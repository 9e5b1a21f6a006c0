//! Temporal entity audit engine
//!
//! Every mutation of an auditable entity is recorded as an immutable,
//! timestamped [`Snapshot`]. The log is append-only; questions about the
//! past are answered by reading it back in commit order.
//!
//! # Architecture
//!
//! - [`CommitClock`] stamps each write with a totally ordered [`Commit`]
//! - [`SnapshotStore`] owns the append-only log (in memory or PostgreSQL)
//! - [`diff`] computes change sets between consecutive snapshots on demand
//! - [`AuditService`] answers the temporal queries and runs the write path
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use cura_common::types::{AuditEntity, InstanceId};
//! use cura_server::audit::{
//!     AuditService, CommitClock, EntityChange, EntityState, InMemorySnapshotStore,
//!     PropertyValue, QueryContext,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let service = AuditService::new(Arc::new(InMemorySnapshotStore::new()), CommitClock::new());
//!
//! let braf = InstanceId::new(AuditEntity::Gene, 673);
//! let state = EntityState::new().with("hugoSymbol", PropertyValue::scalar("BRAF"));
//! service.record(Some("curator"), vec![EntityChange::upsert(braf, state)]).await?;
//!
//! let recent = service
//!     .recent_changes(&QueryContext::background(), AuditEntity::Gene, 20)
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod context;
pub mod diff;
pub mod error;
pub mod models;
pub mod service;
pub mod store;

pub use clock::CommitClock;
pub use context::QueryContext;
pub use diff::{changed_properties, relation_delta, ChangeSet, RelationDelta};
pub use error::{AuditError, AuditResult, StoreError};
pub use models::{
    ChangeKind, Commit, CommitId, EntityChange, EntityState, PropertyValue, Snapshot, SnapshotType,
};
pub use service::{AuditService, ChangeSummary, GainMode, RelationGainQuery};
pub use store::{InMemorySnapshotStore, PgSnapshotStore, SnapshotStore};
