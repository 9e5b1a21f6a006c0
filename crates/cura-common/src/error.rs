//! Error types shared across Cura crates

use thiserror::Error;

/// Result type alias for Cura operations
pub type Result<T> = std::result::Result<T, CuraError>;

/// Main error type for Cura
#[derive(Error, Debug)]
pub enum CuraError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown entity type: {0}")]
    UnknownEntityType(String),

    #[error("Invalid instance id: {0}")]
    InvalidInstanceId(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),
}
