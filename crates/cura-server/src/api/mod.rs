pub mod response;

use crate::audit::{AuditService, InMemorySnapshotStore, PgSnapshotStore, SnapshotStore};
use crate::config::{Config, StoreBackend};
use crate::db;
use crate::error::{AppError, ServerResult};
use crate::features::{self, FeatureState};
use crate::middleware;
use crate::release::{OncoKbInfoClient, ReleaseDateSource, StaticReleaseDate};
use axum::{
    extract::State,
    http::{StatusCode, Uri},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;

/// Open the configured snapshot store and wire the feature state around it
pub async fn build_state(config: &Config) -> ServerResult<FeatureState> {
    let store: Arc<dyn SnapshotStore> = match config.store.backend {
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory snapshot store - history is lost on restart");
            Arc::new(InMemorySnapshotStore::new())
        },
        StoreBackend::Postgres => {
            let pool = db::create_pool(&config.database).await?;
            let store = PgSnapshotStore::new(pool);
            store.migrate().await?;
            tracing::info!("Database migrations completed");
            Arc::new(store)
        },
    };

    let audit = AuditService::resume(store).await?;

    Ok(FeatureState {
        audit: Arc::new(audit),
        release_source: release_source(config)?,
        release_report: config.audit.release_report(),
        query_timeout: config.audit.query_timeout(),
    })
}

/// A configured date wins over the info endpoint
fn release_source(config: &Config) -> ServerResult<Option<Arc<dyn ReleaseDateSource>>> {
    if let Some(date) = config.audit.release_date {
        tracing::info!(%date, "Using configured release date");
        return Ok(Some(Arc::new(StaticReleaseDate(date))));
    }

    match config.audit.oncokb_info_url {
        Some(ref url) => {
            tracing::info!(url = %url, "Reading release date from OncoKB info endpoint");
            let client = OncoKbInfoClient::new(url, config.audit.oncokb_api_token.clone())?;
            Ok(Some(Arc::new(client)))
        },
        None => Ok(None),
    }
}

/// Create the application router with all routes and middleware
pub fn create_router(state: FeatureState, config: &Config) -> Router {
    let health_routes = Router::new()
        .route("/health", get(health))
        .with_state(state.clone());

    Router::new()
        .route("/", get(root))
        .merge(health_routes)
        .merge(features::router(state))
        .fallback(not_found)
        // Apply layers from innermost to outermost
        .layer(CompressionLayer::new())
        .layer(middleware::tracing_layer())
        .layer(middleware::cors_layer(&config.cors))
}

async fn root() -> impl IntoResponse {
    Json(json!({
        "name": "Cura Audit Server",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

/// Health check handler
async fn health(State(state): State<FeatureState>) -> Result<impl IntoResponse, AppError> {
    let store = state.audit.store();
    store.health_check().await?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "store": store.backend()
        })),
    ))
}

async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(format!("No route for {}", uri.path()))
}
