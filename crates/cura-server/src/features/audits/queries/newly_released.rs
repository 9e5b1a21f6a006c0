//! Genes newly released since the current data release
//!
//! A gene is released for a release type when it gains a reference to that
//! type's flag. The window starts at midnight UTC of the release date, taken
//! from the `since` parameter or else from the configured release source.

use crate::audit::{AuditError, AuditService, GainMode, QueryContext};
use crate::release::{release_start, ReleaseDateSource, ReleaseError, ReleaseReport};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewlyReleasedQuery {
    /// Start of the window, overriding the current release date
    pub since: Option<NaiveDate>,
    /// `added` (default) or `present`
    pub mode: Option<GainMode>,
}

/// Release status of one gene for one release type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneReleaseStatus {
    pub hugo_symbol: String,
    pub release_type: String,
}

#[derive(Debug, thiserror::Error)]
pub enum NewlyReleasedError {
    #[error("No release date source is configured; pass 'since' explicitly")]
    ReleaseDateNotConfigured,
    #[error("Release date unavailable: {0}")]
    ReleaseDate(#[from] ReleaseError),
    #[error(transparent)]
    Audit(#[from] AuditError),
}

async fn window_start(
    source: Option<&dyn ReleaseDateSource>,
    query: &NewlyReleasedQuery,
) -> Result<DateTime<Utc>, NewlyReleasedError> {
    let date = match (query.since, source) {
        (Some(since), _) => since,
        (None, Some(source)) => source.current_release_date().await?,
        (None, None) => return Err(NewlyReleasedError::ReleaseDateNotConfigured),
    };
    Ok(release_start(date))
}

/// Display keys released for any configured flag, de-duplicated
#[tracing::instrument(skip(service, ctx, report, source))]
pub async fn handle(
    service: &AuditService,
    ctx: &QueryContext,
    report: &ReleaseReport,
    source: Option<&dyn ReleaseDateSource>,
    query: NewlyReleasedQuery,
) -> Result<Vec<String>, NewlyReleasedError> {
    let statuses = handle_status(service, ctx, report, source, query).await?;

    let mut seen = HashSet::new();
    Ok(statuses
        .into_iter()
        .map(|status| status.hugo_symbol)
        .filter(|symbol| seen.insert(symbol.clone()))
        .collect())
}

/// One status per released gene and release type, in flag order
#[tracing::instrument(skip(service, ctx, report, source))]
pub async fn handle_status(
    service: &AuditService,
    ctx: &QueryContext,
    report: &ReleaseReport,
    source: Option<&dyn ReleaseDateSource>,
    query: NewlyReleasedQuery,
) -> Result<Vec<GeneReleaseStatus>, NewlyReleasedError> {
    let since = window_start(source, &query).await?;
    let mode = query.mode.unwrap_or_default();

    let mut statuses = Vec::new();
    for flag in &report.flags {
        let keys = service
            .entities_gaining_relation(ctx, &report.gain_query(flag, since, mode))
            .await?;

        tracing::debug!(
            release_type = %flag.release_type,
            flag = %flag.flag,
            count = keys.len(),
            "Collected newly released genes"
        );

        statuses.extend(keys.into_iter().map(|hugo_symbol| GeneReleaseStatus {
            hugo_symbol,
            release_type: flag.release_type.clone(),
        }));
    }

    Ok(statuses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{
        CommitClock, EntityChange, EntityState, InMemorySnapshotStore, PropertyValue,
    };
    use crate::release::{parse_release_flags, StaticReleaseDate};
    use chrono::{Duration, TimeZone};
    use cura_common::types::{AuditEntity, InstanceId};
    use std::sync::Arc;

    fn report() -> ReleaseReport {
        ReleaseReport {
            entity_type: AuditEntity::Gene,
            relation_property: "flags".to_string(),
            display_property: "hugoSymbol".to_string(),
            flags: parse_release_flags("SOMATIC:ONCOKB_SOMATIC:1,GERMLINE:ONCOKB_GERMLINE:2").unwrap(),
        }
    }

    fn gene(id: i64, symbol: &str, flags: &[i64]) -> EntityChange {
        EntityChange::upsert(
            InstanceId::new(AuditEntity::Gene, id),
            EntityState::new()
                .with("hugoSymbol", PropertyValue::scalar(symbol))
                .with(
                    "flags",
                    PropertyValue::relation(
                        flags.iter().map(|&f| InstanceId::new(AuditEntity::Flag, f)),
                    ),
                ),
        )
    }

    /// One commit per day starting 2025-07-01
    async fn seeded() -> AuditService {
        let day = Arc::new(std::sync::atomic::AtomicI64::new(0));
        let clock = CommitClock::with_time_source(Arc::new(move || {
            let n = day.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Utc.with_ymd_and_hms(2025, 7, 1, 12, 0, 0).unwrap() + Duration::days(n)
        }));
        let service = AuditService::new(Arc::new(InMemorySnapshotStore::new()), clock);

        // 07-01: KRAS already somatic; 07-02: BRAF created without flags
        service.record(None, vec![gene(2, "KRAS", &[1])]).await.unwrap();
        service.record(None, vec![gene(1, "BRAF", &[])]).await.unwrap();
        // 07-03: BRAF gains somatic; 07-04: BRAF gains germline
        service.record(None, vec![gene(1, "BRAF", &[1])]).await.unwrap();
        service.record(None, vec![gene(1, "BRAF", &[1, 2])]).await.unwrap();
        service
    }

    fn since_july_3() -> NewlyReleasedQuery {
        NewlyReleasedQuery {
            since: NaiveDate::from_ymd_opt(2025, 7, 3),
            mode: None,
        }
    }

    #[tokio::test]
    async fn test_symbols_are_deduplicated_across_flags() {
        let service = seeded().await;
        let symbols = handle(&service, &QueryContext::background(), &report(), None, since_july_3())
            .await
            .unwrap();
        assert_eq!(symbols, vec!["BRAF".to_string()]);
    }

    #[tokio::test]
    async fn test_status_per_release_type() {
        let service = seeded().await;
        let statuses =
            handle_status(&service, &QueryContext::background(), &report(), None, since_july_3())
                .await
                .unwrap();

        assert_eq!(
            statuses,
            vec![
                GeneReleaseStatus {
                    hugo_symbol: "BRAF".to_string(),
                    release_type: "SOMATIC".to_string()
                },
                GeneReleaseStatus {
                    hugo_symbol: "BRAF".to_string(),
                    release_type: "GERMLINE".to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_release_date_comes_from_source() {
        let service = seeded().await;
        let source = StaticReleaseDate(NaiveDate::from_ymd_opt(2025, 7, 4).unwrap());

        let statuses = handle_status(
            &service,
            &QueryContext::background(),
            &report(),
            Some(&source),
            NewlyReleasedQuery::default(),
        )
        .await
        .unwrap();

        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].release_type, "GERMLINE");
    }

    #[tokio::test]
    async fn test_missing_release_date_is_an_error() {
        let service = seeded().await;
        let result = handle(
            &service,
            &QueryContext::background(),
            &report(),
            None,
            NewlyReleasedQuery::default(),
        )
        .await;
        assert!(matches!(result, Err(NewlyReleasedError::ReleaseDateNotConfigured)));
    }
}
