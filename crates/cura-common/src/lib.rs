//! Cura Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared identity types, error handling and logging for the Cura audit workspace.
//!
//! # Overview
//!
//! - **Types**: the closed registry of auditable entity kinds and the stable
//!   `(entity type, primary key)` identity of a versioned record
//! - **Error Handling**: common error and result types
//! - **Logging**: centralized `tracing` subscriber setup
//!
//! # Example
//!
//! ```no_run
//! use cura_common::types::{AuditEntity, InstanceId};
//!
//! fn gene(id: i64) -> cura_common::Result<InstanceId> {
//!     let entity_type: AuditEntity = "Gene".parse()?;
//!     Ok(InstanceId::new(entity_type, id))
//! }
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{CuraError, Result};
