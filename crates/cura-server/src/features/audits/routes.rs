//! Audit API routes
//!
//! # Route Structure
//!
//! - `GET /api/audits/entity/all` - Auditable entity type names
//! - `GET /api/audits/entity/changes` - Recent changes of one entity type
//! - `GET /api/audits/entity/changes/version/previous` - Snapshot preceding a commit
//! - `GET /api/audits/entity/changes/diff` - What a commit changed on an entity
//! - `GET /api/audits/entity/genes/newly-released` - Genes released since the release date
//! - `GET /api/audits/entity/genes/newly-released/status` - Same, per release type
//! - `POST /api/audits/entity/commits` - Record a commit of entity changes
//!
//! Read endpoints answer with bare JSON values; every request runs under a
//! [`QueryContext`] bounded by the configured query timeout.

use crate::api::response::{ApiResponse, ErrorResponse};
use crate::audit::{AuditError, QueryContext};
use crate::features::FeatureState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use super::{
    commands::{RecordCommitCommand, RecordCommitError},
    queries::{
        ChangeSetQuery, ListEntityTypesQuery, NewlyReleasedError,
        NewlyReleasedQuery, PreviousVersionError, PreviousVersionQuery, RecentChangesError,
        RecentChangesQuery,
    },
};

/// Path of the recent-changes endpoint, repeated in its `Link` header
const CHANGES_PATH: &str = "/api/audits/entity/changes";

// ============================================================================
// Router Configuration
// ============================================================================

pub fn audits_routes() -> Router<FeatureState> {
    Router::new()
        .route("/entity/all", get(list_entity_types))
        .route("/entity/changes", get(recent_changes))
        .route("/entity/changes/version/previous", get(previous_version))
        .route("/entity/changes/diff", get(change_set))
        .route("/entity/genes/newly-released", get(newly_released))
        .route("/entity/genes/newly-released/status", get(newly_released_status))
        .route("/entity/commits", post(record_commit))
}

fn query_context(state: &FeatureState) -> QueryContext {
    QueryContext::with_timeout(state.query_timeout)
}

// ============================================================================
// Query Handlers (Read Operations)
// ============================================================================

/// List auditable entity types
///
/// # Endpoint
///
/// `GET /api/audits/entity/all`
///
/// # Response
///
/// - `200 OK` - `["Alteration", "Article", ...]`
async fn list_entity_types() -> Response {
    let response = super::queries::list_entities::handle(ListEntityTypesQuery);
    (StatusCode::OK, Json(response)).into_response()
}

/// Most recent changes of one entity type, newest first
///
/// # Endpoint
///
/// `GET /api/audits/entity/changes?entityType=Gene&limit=20&page=0&size=10`
///
/// # Response
///
/// - `200 OK` - Array of audit events with `X-Total-Count` and `Link` headers
/// - `400 Bad Request` - Unknown entity type or invalid paging
/// - `504 Gateway Timeout` - Query exceeded the configured timeout
#[tracing::instrument(
    skip(state, query),
    fields(entity_type = %query.entity_type, limit = query.limit)
)]
async fn recent_changes(
    State(state): State<FeatureState>,
    Query(query): Query<RecentChangesQuery>,
) -> Result<Response, AuditApiError> {
    let params = [
        ("entityType", query.entity_type.clone()),
        ("limit", query.limit.to_string()),
    ];
    let page =
        super::queries::recent_changes::handle(&state.audit, &query_context(&state), query).await?;

    tracing::debug!(count = page.items.len(), total = page.total, "Recent changes listed via API");

    let headers = page.headers(CHANGES_PATH, &params);
    Ok((StatusCode::OK, headers, Json(page.items)).into_response())
}

/// Snapshot of an entity immediately preceding a commit
///
/// # Endpoint
///
/// `GET /api/audits/entity/changes/version/previous?entityType=Gene&entityId=673&commitId=12`
///
/// # Response
///
/// - `200 OK` - The previous audit event, or an empty body when the commit
///   created the entity's first snapshot
/// - `400 Bad Request` - The commit is not a snapshot of the entity
#[tracing::instrument(skip(state))]
async fn previous_version(
    State(state): State<FeatureState>,
    Query(query): Query<PreviousVersionQuery>,
) -> Result<Response, AuditApiError> {
    let previous =
        super::queries::previous_version::handle(&state.audit, &query_context(&state), query)
            .await?;

    Ok(match previous {
        Some(event) => (StatusCode::OK, Json(event)).into_response(),
        None => StatusCode::OK.into_response(),
    })
}

/// Properties and relation references changed by a commit
///
/// # Endpoint
///
/// `GET /api/audits/entity/changes/diff?entityType=Gene&entityId=673&commitId=12`
///
/// # Response
///
/// - `200 OK` - Change set summary
/// - `400 Bad Request` - The commit is not a snapshot of the entity
#[tracing::instrument(skip(state))]
async fn change_set(
    State(state): State<FeatureState>,
    Query(query): Query<ChangeSetQuery>,
) -> Result<Response, AuditApiError> {
    let response =
        super::queries::change_set::handle(&state.audit, &query_context(&state), query).await?;
    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Genes that gained any release flag since the release date
///
/// # Endpoint
///
/// `GET /api/audits/entity/genes/newly-released?since=2025-07-01&mode=added`
///
/// # Response
///
/// - `200 OK` - `["BRAF", "KRAS"]`
/// - `503 Service Unavailable` - No release date could be determined
#[tracing::instrument(skip(state))]
async fn newly_released(
    State(state): State<FeatureState>,
    Query(query): Query<NewlyReleasedQuery>,
) -> Result<Response, AuditApiError> {
    let symbols = super::queries::newly_released::handle(
        &state.audit,
        &query_context(&state),
        &state.release_report,
        state.release_source.as_deref(),
        query,
    )
    .await?;

    Ok((StatusCode::OK, Json(symbols)).into_response())
}

/// Newly released genes paired with the release type they gained
///
/// # Endpoint
///
/// `GET /api/audits/entity/genes/newly-released/status?since=2025-07-01`
///
/// # Response
///
/// - `200 OK` - `[{"hugoSymbol": "BRAF", "releaseType": "SOMATIC"}]`
/// - `503 Service Unavailable` - No release date could be determined
#[tracing::instrument(skip(state))]
async fn newly_released_status(
    State(state): State<FeatureState>,
    Query(query): Query<NewlyReleasedQuery>,
) -> Result<Response, AuditApiError> {
    let statuses = super::queries::newly_released::handle_status(
        &state.audit,
        &query_context(&state),
        &state.release_report,
        state.release_source.as_deref(),
        query,
    )
    .await?;

    Ok((StatusCode::OK, Json(statuses)).into_response())
}

// ============================================================================
// Command Handlers (Write Operations)
// ============================================================================

/// Record one commit of entity changes
///
/// # Endpoint
///
/// `POST /api/audits/entity/commits`
///
/// # Response
///
/// - `201 Created` - Commit metadata and the snapshots written
/// - `400 Bad Request` - Empty commit, duplicate instance or delete without history
#[tracing::instrument(skip(state, command), fields(changes = command.changes.len()))]
async fn record_commit(
    State(state): State<FeatureState>,
    Json(command): Json<RecordCommitCommand>,
) -> Result<Response, AuditApiError> {
    let response = super::commands::record_commit::handle(&state.audit, command).await?;

    tracing::info!(
        commit = response.commit.id,
        snapshots = response.snapshots.len(),
        "Commit recorded via API"
    );

    Ok((StatusCode::CREATED, Json(ApiResponse::success(response))).into_response())
}

// ============================================================================
// Error Handling
// ============================================================================

/// Unified error type for audit API endpoints
#[derive(Debug)]
enum AuditApiError {
    RecentChanges(RecentChangesError),
    PreviousVersion(PreviousVersionError),
    NewlyReleased(NewlyReleasedError),
    RecordCommit(RecordCommitError),
}

impl From<RecentChangesError> for AuditApiError {
    fn from(err: RecentChangesError) -> Self {
        Self::RecentChanges(err)
    }
}

// Also covers ChangeSetError, which is the same type
impl From<PreviousVersionError> for AuditApiError {
    fn from(err: PreviousVersionError) -> Self {
        Self::PreviousVersion(err)
    }
}

impl From<NewlyReleasedError> for AuditApiError {
    fn from(err: NewlyReleasedError) -> Self {
        Self::NewlyReleased(err)
    }
}

impl From<RecordCommitError> for AuditApiError {
    fn from(err: RecordCommitError) -> Self {
        Self::RecordCommit(err)
    }
}

fn error_response(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    (status, Json(ErrorResponse::new(code, message))).into_response()
}

fn audit_error_response(err: AuditError) -> Response {
    match err {
        AuditError::UnknownEntityType(_) => {
            error_response(StatusCode::BAD_REQUEST, "UNKNOWN_ENTITY_TYPE", err.to_string())
        },
        AuditError::UnknownCommit {
            ref instance,
            ref commit,
        } => {
            let error = ErrorResponse::with_details(
                "UNKNOWN_COMMIT",
                err.to_string(),
                json!({ "instance": instance, "commitId": commit }),
            );
            (StatusCode::BAD_REQUEST, Json(error)).into_response()
        },
        AuditError::InvalidChange(_) => {
            error_response(StatusCode::BAD_REQUEST, "INVALID_CHANGE", err.to_string())
        },
        AuditError::Timeout => {
            tracing::warn!("Audit query timed out");
            error_response(StatusCode::GATEWAY_TIMEOUT, "TIMEOUT", err.to_string())
        },
        AuditError::Cancelled => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, "CANCELLED", err.to_string())
        },
        AuditError::Store(ref e) => {
            tracing::error!("Snapshot store error: {}", e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "STORE_ERROR",
                "A snapshot store error occurred",
            )
        },
    }
}

impl IntoResponse for AuditApiError {
    fn into_response(self) -> Response {
        match self {
            AuditApiError::RecentChanges(RecentChangesError::UnknownEntityType(_))
            | AuditApiError::PreviousVersion(PreviousVersionError::UnknownEntityType(_)) => {
                error_response(StatusCode::BAD_REQUEST, "UNKNOWN_ENTITY_TYPE", self.to_string())
            },
            AuditApiError::RecentChanges(RecentChangesError::Validation(_))
            | AuditApiError::PreviousVersion(PreviousVersionError::InvalidEntityId(_))
            | AuditApiError::RecordCommit(RecordCommitError::NoChanges)
            | AuditApiError::RecordCommit(RecordCommitError::AuthorLength) => {
                error_response(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", self.to_string())
            },
            AuditApiError::NewlyReleased(NewlyReleasedError::ReleaseDateNotConfigured)
            | AuditApiError::NewlyReleased(NewlyReleasedError::ReleaseDate(_)) => {
                tracing::warn!("Release date unavailable: {}", self);
                error_response(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "RELEASE_DATE_UNAVAILABLE",
                    self.to_string(),
                )
            },
            AuditApiError::RecentChanges(RecentChangesError::Audit(e))
            | AuditApiError::PreviousVersion(PreviousVersionError::Audit(e))
            | AuditApiError::NewlyReleased(NewlyReleasedError::Audit(e))
            | AuditApiError::RecordCommit(RecordCommitError::Audit(e)) => audit_error_response(e),
        }
    }
}

impl std::fmt::Display for AuditApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditApiError::RecentChanges(e) => write!(f, "{}", e),
            AuditApiError::PreviousVersion(e) => write!(f, "{}", e),
            AuditApiError::NewlyReleased(e) => write!(f, "{}", e),
            AuditApiError::RecordCommit(e) => write!(f, "{}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cura_common::types::{AuditEntity, InstanceId};
    use crate::audit::{CommitId, StoreError};

    #[test]
    fn test_error_status_codes() {
        let cases = [
            (
                AuditApiError::from(RecentChangesError::UnknownEntityType("Protein".into())),
                StatusCode::BAD_REQUEST,
            ),
            (
                AuditApiError::from(PreviousVersionError::Audit(AuditError::UnknownCommit {
                    instance: InstanceId::new(AuditEntity::Gene, 1),
                    commit: CommitId(9),
                })),
                StatusCode::BAD_REQUEST,
            ),
            (
                AuditApiError::from(NewlyReleasedError::ReleaseDateNotConfigured),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                AuditApiError::from(RecentChangesError::Audit(AuditError::Timeout)),
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                AuditApiError::from(RecordCommitError::Audit(AuditError::Store(
                    StoreError::Corrupt("bad row".into()),
                ))),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }
}
