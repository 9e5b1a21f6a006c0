//! Cura Audit Server Library
//!
//! Versioned history of curated knowledge-base entities, served over HTTP.
//!
//! # Overview
//!
//! - **Audit engine**: append-only snapshot log with commit clock, diff engine
//!   and temporal queries ([`audit`])
//! - **Snapshot stores**: in-memory and PostgreSQL (SQLx) backends
//! - **API endpoints**: `/api/audits/...` feature slice ([`features`])
//! - **Release reports**: genes newly released since the current data release
//!   ([`release`])
//! - **Configuration**: environment-based configuration management
//! - **Middleware**: CORS and request tracing
//!
//! # Architecture
//!
//! - **Commands** (write operations) record commits of entity changes
//! - **Queries** (read operations) replay the snapshot log: recent changes,
//!   previous versions, change sets and relation gains
//!
//! ## Framework Stack
//!
//! - **Axum**: HTTP routing and extractors
//! - **SQLx**: PostgreSQL snapshot store and migrations
//! - **Tower**: Middleware and service abstractions
//!
//! # Example
//!
//! ```no_run
//! use cura_server::{api, config::Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let state = api::build_state(&config).await?;
//!     let app = api::create_router(state, &config);
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod audit;
pub mod config;
pub mod db;
pub mod error;
pub mod features;
pub mod middleware;
pub mod release;

// Re-export commonly used types
pub use error::{AppError, ServerError, ServerResult};
