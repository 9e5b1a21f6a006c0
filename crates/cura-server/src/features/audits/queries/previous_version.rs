use crate::audit::{AuditError, AuditService, CommitId, QueryContext};
use crate::features::audits::types::EntityAuditEvent;
use cura_common::types::{AuditEntity, InstanceId, PrimaryKey};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviousVersionQuery {
    pub entity_type: String,
    pub entity_id: String,
    pub commit_id: u64,
}

/// `None` when the commit created the entity's first snapshot
pub type PreviousVersionResponse = Option<EntityAuditEvent>;

#[derive(Debug, thiserror::Error)]
pub enum PreviousVersionError {
    #[error("Unknown entity type: {0}")]
    UnknownEntityType(String),
    #[error("Invalid entity id '{0}'")]
    InvalidEntityId(String),
    #[error(transparent)]
    Audit(#[from] AuditError),
}

impl PreviousVersionQuery {
    pub fn validate(&self) -> Result<InstanceId, PreviousVersionError> {
        let entity_type: AuditEntity = self
            .entity_type
            .parse()
            .map_err(|_| PreviousVersionError::UnknownEntityType(self.entity_type.clone()))?;
        let id: PrimaryKey = self
            .entity_id
            .parse()
            .map_err(|_| PreviousVersionError::InvalidEntityId(self.entity_id.clone()))?;

        Ok(InstanceId::new(entity_type, id))
    }
}

#[tracing::instrument(skip(service, ctx))]
pub async fn handle(
    service: &AuditService,
    ctx: &QueryContext,
    query: PreviousVersionQuery,
) -> Result<PreviousVersionResponse, PreviousVersionError> {
    let instance = query.validate()?;

    let previous = service
        .previous_version(ctx, &instance, CommitId(query.commit_id))
        .await?;

    Ok(previous.as_ref().map(EntityAuditEvent::from))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{CommitClock, EntityChange, EntityState, InMemorySnapshotStore, PropertyValue};
    use std::sync::Arc;

    fn query(entity_type: &str, entity_id: &str, commit_id: u64) -> PreviousVersionQuery {
        PreviousVersionQuery {
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            commit_id,
        }
    }

    #[test]
    fn test_validation() {
        assert_eq!(
            query("Drug", "42", 1).validate().unwrap(),
            InstanceId::new(AuditEntity::Drug, 42)
        );
        assert!(matches!(
            query("Medicine", "42", 1).validate(),
            Err(PreviousVersionError::UnknownEntityType(_))
        ));
        assert!(matches!(
            query("Drug", " ", 1).validate(),
            Err(PreviousVersionError::InvalidEntityId(_))
        ));
    }

    #[tokio::test]
    async fn test_handle() {
        let service = AuditService::new(Arc::new(InMemorySnapshotStore::new()), CommitClock::new());
        let drug = InstanceId::new(AuditEntity::Drug, 42);
        let mut commits = Vec::new();
        for name in ["Vemurafenib", "Vemurafenib (Zelboraf)"] {
            let (commit, _) = service
                .record(
                    None,
                    vec![EntityChange::upsert(
                        drug.clone(),
                        EntityState::new().with("name", PropertyValue::scalar(name)),
                    )],
                )
                .await
                .unwrap();
            commits.push(commit.id.0);
        }
        let ctx = QueryContext::background();

        let previous = handle(&service, &ctx, query("Drug", "42", commits[1]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(previous.id, commits[0]);
        assert_eq!(previous.entity_value["name"], "Vemurafenib");

        let none = handle(&service, &ctx, query("Drug", "42", commits[0])).await.unwrap();
        assert!(none.is_none());

        let unknown = handle(&service, &ctx, query("Drug", "42", 999)).await;
        assert!(matches!(
            unknown,
            Err(PreviousVersionError::Audit(AuditError::UnknownCommit { .. }))
        ));
    }
}
