//! Common test utilities for Cura server integration tests
//!
//! - In-memory application state with a deterministic commit clock
//! - PostgreSQL container with migrations applied (requires Docker)
//! - Helpers for driving the router with `oneshot`

#![allow(dead_code)]

use anyhow::{Context, Result};
use axum::{
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode},
    Router,
};
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, TimeZone, Utc};
use cura_common::types::{AuditEntity, InstanceId};
use cura_server::{
    api,
    audit::{
        AuditService, CommitClock, EntityChange, EntityState, InMemorySnapshotStore,
        PgSnapshotStore, PropertyValue,
    },
    config::Config,
    features::FeatureState,
    release::{parse_release_flags, ReleaseDateSource, ReleaseReport, StaticReleaseDate},
};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::{
    atomic::{AtomicI64, Ordering},
    Arc,
};
use std::time::Duration;
use testcontainers::{core::IntoContainerPort, runners::AsyncRunner, ContainerAsync};
use testcontainers_modules::postgres::Postgres;
use tower::ServiceExt;

/// First commit timestamp of the tick clock
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 7, 1, 12, 0, 0).unwrap()
}

/// A clock that advances one day per commit, starting at [`epoch`]
pub fn daily_clock() -> CommitClock {
    let day = Arc::new(AtomicI64::new(0));
    CommitClock::with_time_source(Arc::new(move || {
        epoch() + ChronoDuration::days(day.fetch_add(1, Ordering::SeqCst))
    }))
}

pub fn release_report() -> ReleaseReport {
    ReleaseReport {
        entity_type: AuditEntity::Gene,
        relation_property: "flags".to_string(),
        display_property: "hugoSymbol".to_string(),
        flags: parse_release_flags("SOMATIC:ONCOKB_SOMATIC:1,GERMLINE:ONCOKB_GERMLINE:2").unwrap(),
    }
}

/// Feature state over an empty in-memory store
pub fn memory_state(release_date: Option<NaiveDate>) -> FeatureState {
    let audit = AuditService::new(Arc::new(InMemorySnapshotStore::new()), daily_clock());
    let release_source: Option<Arc<dyn ReleaseDateSource>> = match release_date {
        Some(date) => Some(Arc::new(StaticReleaseDate(date))),
        None => None,
    };

    FeatureState {
        audit: Arc::new(audit),
        release_source,
        release_report: release_report(),
        query_timeout: Duration::from_secs(30),
    }
}

pub fn app(state: FeatureState) -> Router {
    api::create_router(state, &Config::default())
}

pub fn gene(id: i64, symbol: &str, flags: &[i64]) -> EntityChange {
    EntityChange::upsert(
        InstanceId::new(AuditEntity::Gene, id),
        EntityState::new()
            .with("hugoSymbol", PropertyValue::scalar(symbol))
            .with(
                "flags",
                PropertyValue::relation(flags.iter().map(|&f| InstanceId::new(AuditEntity::Flag, f))),
            ),
    )
}

/// Send one request and decode the body as JSON (`Null` when empty)
pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, HeaderMap, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).unwrap())
        },
        None => Body::empty(),
    };

    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, headers, json)
}

pub async fn get(app: &Router, uri: &str) -> (StatusCode, HeaderMap, Value) {
    send(app, Method::GET, uri, None).await
}

pub async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, HeaderMap, Value) {
    send(app, Method::POST, uri, Some(body)).await
}

// ============================================================================
// PostgreSQL Test Container
// ============================================================================

/// PostgreSQL container with the snapshot schema migrated
pub struct TestPostgres {
    _container: ContainerAsync<Postgres>,
    pool: PgPool,
}

impl TestPostgres {
    pub async fn start() -> Result<Self> {
        let container = Postgres::default()
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;

        let host = container
            .get_host()
            .await
            .context("Failed to get container host")?;
        let port = container
            .get_host_port_ipv4(5432.tcp())
            .await
            .context("Failed to get container port")?;

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&format!("postgresql://postgres:postgres@{}:{}/postgres", host, port))
            .await
            .context("Failed to connect to PostgreSQL")?;

        PgSnapshotStore::new(pool.clone())
            .migrate()
            .await
            .context("Failed to run migrations")?;

        Ok(Self {
            _container: container,
            pool,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn store(&self) -> PgSnapshotStore {
        PgSnapshotStore::new(self.pool.clone())
    }
}
