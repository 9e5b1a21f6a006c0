//! Feature modules implementing the audit API
//!
//! Each feature is a vertical slice with its own commands, queries and routes.
//!
//! # Features
//!
//! - **audits**: Entity history, previous versions, change sets, newly
//!   released genes and the commit write path
//!
//! # Architecture
//!
//! Each feature module follows the structure:
//! - `commands/` - Write operations
//! - `queries/` - Read operations
//! - `routes.rs` - HTTP route definitions
//! - `types.rs` - Response types shared by the slice

pub mod audits;
pub mod shared;

use crate::audit::AuditService;
use crate::release::{ReleaseDateSource, ReleaseReport};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;

/// Shared state for all feature routes
#[derive(Clone)]
pub struct FeatureState {
    /// Temporal query service over the configured snapshot store
    pub audit: Arc<AuditService>,
    /// Where the current release date comes from, if anywhere
    pub release_source: Option<Arc<dyn ReleaseDateSource>>,
    pub release_report: ReleaseReport,
    /// Deadline given to every request's query context
    pub query_timeout: Duration,
}

/// Creates the API router with all feature routes mounted
///
/// - `/api/audits` - Audit history and release reports
pub fn router(state: FeatureState) -> Router<()> {
    Router::new().nest("/api/audits", audits::audits_routes().with_state(state))
}
