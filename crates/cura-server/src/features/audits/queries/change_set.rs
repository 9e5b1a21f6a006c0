use crate::audit::{AuditService, CommitId, QueryContext, RelationDelta};
use crate::features::audits::queries::previous_version::{PreviousVersionError, PreviousVersionQuery};
use crate::features::audits::types::CommitMetadata;
use cura_common::types::{AuditEntity, PrimaryKey};
use serde::Serialize;

/// Same parameters as the previous-version lookup
pub type ChangeSetQuery = PreviousVersionQuery;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSetResponse {
    pub entity_type: AuditEntity,
    pub entity_id: PrimaryKey,
    pub commit_metadata: CommitMetadata,
    pub action: String,
    pub commit_version: u64,
    /// Commit of the predecessor, absent for a first snapshot
    pub previous_commit_id: Option<u64>,
    pub changed_properties: Vec<String>,
    pub relations: Vec<RelationDelta>,
}

pub type ChangeSetError = PreviousVersionError;

#[tracing::instrument(skip(service, ctx))]
pub async fn handle(
    service: &AuditService,
    ctx: &QueryContext,
    query: ChangeSetQuery,
) -> Result<ChangeSetResponse, ChangeSetError> {
    let instance = query.validate()?;

    let summary = service
        .change_set(ctx, &instance, CommitId(query.commit_id))
        .await?;

    Ok(ChangeSetResponse {
        entity_type: instance.entity_type,
        entity_id: instance.id,
        commit_metadata: CommitMetadata::from(&summary.snapshot.commit),
        action: summary.snapshot.kind.action().to_string(),
        commit_version: summary.snapshot.version,
        previous_commit_id: summary.previous.map(|p| p.commit.id.0),
        changed_properties: summary.changed.into_iter().collect(),
        relations: summary.relations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditError, CommitClock, EntityChange, EntityState, InMemorySnapshotStore, PropertyValue};
    use cura_common::types::InstanceId;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_change_set_of_relation_update() {
        let service = AuditService::new(Arc::new(InMemorySnapshotStore::new()), CommitClock::new());
        let gene = InstanceId::new(AuditEntity::Gene, 7157);
        let flag = |id: i64| InstanceId::new(AuditEntity::Flag, id);

        service
            .record(
                None,
                vec![EntityChange::upsert(
                    gene.clone(),
                    EntityState::new()
                        .with("hugoSymbol", PropertyValue::scalar("TP53"))
                        .with("flags", PropertyValue::relation([flag(2)])),
                )],
            )
            .await
            .unwrap();
        let (second, _) = service
            .record(
                Some("curator"),
                vec![EntityChange::upsert(
                    gene,
                    EntityState::new()
                        .with("hugoSymbol", PropertyValue::scalar("TP53"))
                        .with("flags", PropertyValue::relation([flag(1), flag(2)])),
                )],
            )
            .await
            .unwrap();

        let response = handle(
            &service,
            &QueryContext::background(),
            ChangeSetQuery {
                entity_type: "Gene".to_string(),
                entity_id: "7157".to_string(),
                commit_id: second.id.0,
            },
        )
        .await
        .unwrap();

        assert_eq!(response.changed_properties, vec!["flags".to_string()]);
        assert_eq!(response.previous_commit_id, Some(second.id.0 - 1));
        assert_eq!(response.action, "UPDATE");
        assert_eq!(response.relations.len(), 1);
        assert!(response.relations[0].added.contains(&flag(1)));
        assert!(response.relations[0].removed.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_commit() {
        let service = AuditService::new(Arc::new(InMemorySnapshotStore::new()), CommitClock::new());
        let err = handle(
            &service,
            &QueryContext::background(),
            ChangeSetQuery {
                entity_type: "Gene".to_string(),
                entity_id: "1".to_string(),
                commit_id: 1,
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            ChangeSetError::Audit(AuditError::UnknownCommit { .. })
        ));
    }
}
