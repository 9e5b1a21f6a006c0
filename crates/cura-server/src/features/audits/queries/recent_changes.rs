use crate::audit::{AuditError, AuditService, QueryContext};
use crate::features::audits::types::EntityAuditEvent;
use crate::features::shared::pagination::{Page, PageRequest};
use cura_common::types::AuditEntity;
use serde::{Deserialize, Serialize};

/// Number of changes returned when the caller gives no limit
pub const DEFAULT_LIMIT: i64 = 20;

fn default_limit() -> i64 {
    DEFAULT_LIMIT
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentChangesQuery {
    pub entity_type: String,
    /// Non-positive limits yield an empty list
    #[serde(default = "default_limit")]
    pub limit: i64,
    /// 0-based page number
    pub page: Option<i64>,
    pub size: Option<i64>,
}

pub type RecentChangesResponse = Page<EntityAuditEvent>;

#[derive(Debug, thiserror::Error)]
pub enum RecentChangesError {
    #[error("Unknown entity type: {0}")]
    UnknownEntityType(String),
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Audit(#[from] AuditError),
}

impl RecentChangesQuery {
    pub fn page_request(&self) -> PageRequest {
        PageRequest::new(self.page, self.size)
    }

    pub fn validate(&self) -> Result<AuditEntity, RecentChangesError> {
        self.page_request()
            .validate()
            .map_err(|e| RecentChangesError::Validation(e.to_string()))?;

        self.entity_type
            .parse()
            .map_err(|_| RecentChangesError::UnknownEntityType(self.entity_type.clone()))
    }
}

#[tracing::instrument(skip(service, ctx))]
pub async fn handle(
    service: &AuditService,
    ctx: &QueryContext,
    query: RecentChangesQuery,
) -> Result<RecentChangesResponse, RecentChangesError> {
    let entity_type = query.validate()?;

    let snapshots = service.recent_changes(ctx, entity_type, query.limit).await?;
    let events = snapshots.iter().map(EntityAuditEvent::from).collect();

    Ok(query.page_request().slice(events))
}
