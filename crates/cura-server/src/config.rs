//! Configuration management

use crate::release::{parse_release_flags, ReleaseFlag, ReleaseReport};
use chrono::NaiveDate;
use cura_common::types::AuditEntity;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================================================
// Server Configuration Constants
// ============================================================================

/// Default server host binding.
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 8000;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/cura";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 2;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default database idle timeout in seconds (10 minutes).
pub const DEFAULT_DATABASE_IDLE_TIMEOUT_SECS: u64 = 600;

/// Default CORS allowed origin for local development.
pub const DEFAULT_CORS_ALLOWED_ORIGIN: &str = "http://localhost:3000";

// ============================================================================
// Audit Configuration Constants
// ============================================================================

/// Default per-request query timeout in seconds.
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

/// Default release flags: somatic and germline OncoKB flags.
pub const DEFAULT_RELEASE_FLAGS: &str = "SOMATIC:ONCOKB_SOMATIC:1,GERMLINE:ONCOKB_GERMLINE:2";

/// Default entity type of the newly-released report.
pub const DEFAULT_RELEASE_ENTITY: AuditEntity = AuditEntity::Gene;

/// Default relation property holding release flags.
pub const DEFAULT_RELEASE_RELATION: &str = "flags";

/// Default property displayed for released entities.
pub const DEFAULT_RELEASE_DISPLAY: &str = "hugoSymbol";

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub database: DatabaseConfig,
    pub cors: CorsConfig,
    pub audit: AuditConfig,
}

/// Server-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
}

/// Which snapshot store backs the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    #[default]
    Postgres,
}

impl std::str::FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "in-memory" => Ok(StoreBackend::Memory),
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            other => Err(anyhow::anyhow!("Invalid store backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
}

/// Audit query and release report configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    pub query_timeout_secs: u64,
    /// Fixed release date; takes precedence over the info endpoint
    pub release_date: Option<NaiveDate>,
    /// Base URL of the OncoKB API serving `/api/v1/info`
    pub oncokb_info_url: Option<String>,
    #[serde(skip_serializing)]
    pub oncokb_api_token: Option<String>,
    pub release_flags: Vec<ReleaseFlag>,
    pub release_entity: AuditEntity,
    pub release_relation: String,
    pub release_display: String,
}

impl AuditConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn release_report(&self) -> ReleaseReport {
        ReleaseReport {
            entity_type: self.release_entity,
            relation_property: self.release_relation.clone(),
            display_property: self.release_display.clone(),
            flags: self.release_flags.clone(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let release_date = match env_non_empty("CURA_RELEASE_DATE") {
            Some(date) => Some(
                NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
                    .map_err(|e| anyhow::anyhow!("Invalid CURA_RELEASE_DATE '{}': {}", date, e))?,
            ),
            None => None,
        };

        let release_flags = parse_release_flags(
            &std::env::var("CURA_RELEASE_FLAGS").unwrap_or_else(|_| DEFAULT_RELEASE_FLAGS.to_string()),
        )?;

        let release_entity = match env_non_empty("CURA_RELEASE_ENTITY") {
            Some(name) => name.trim().parse()?,
            None => DEFAULT_RELEASE_ENTITY,
        };

        let config = Config {
            server: ServerConfig {
                host: std::env::var("CURA_HOST").unwrap_or_else(|_| DEFAULT_SERVER_HOST.to_string()),
                port: env_parse("CURA_PORT").unwrap_or(DEFAULT_SERVER_PORT),
                shutdown_timeout_secs: env_parse("CURA_SHUTDOWN_TIMEOUT")
                    .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
            },
            store: StoreConfig {
                backend: match env_non_empty("CURA_STORE") {
                    Some(backend) => backend.parse()?,
                    None => StoreBackend::default(),
                },
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
                max_connections: env_parse("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or(DEFAULT_DATABASE_MAX_CONNECTIONS),
                min_connections: env_parse("DATABASE_MIN_CONNECTIONS")
                    .unwrap_or(DEFAULT_DATABASE_MIN_CONNECTIONS),
                connect_timeout_secs: env_parse("DATABASE_CONNECT_TIMEOUT")
                    .unwrap_or(DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS),
                idle_timeout_secs: env_parse("DATABASE_IDLE_TIMEOUT")
                    .unwrap_or(DEFAULT_DATABASE_IDLE_TIMEOUT_SECS),
            },
            cors: CorsConfig {
                allowed_origins: std::env::var("CORS_ALLOWED_ORIGINS")
                    .unwrap_or_else(|_| DEFAULT_CORS_ALLOWED_ORIGIN.to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                allow_credentials: env_parse("CORS_ALLOW_CREDENTIALS").unwrap_or(true),
            },
            audit: AuditConfig {
                query_timeout_secs: env_parse("CURA_QUERY_TIMEOUT_SECS")
                    .unwrap_or(DEFAULT_QUERY_TIMEOUT_SECS),
                release_date,
                oncokb_info_url: env_non_empty("ONCOKB_INFO_URL"),
                oncokb_api_token: env_non_empty("ONCOKB_API_TOKEN"),
                release_flags,
                release_entity,
                release_relation: env_non_empty("CURA_RELEASE_RELATION")
                    .unwrap_or_else(|| DEFAULT_RELEASE_RELATION.to_string()),
                release_display: env_non_empty("CURA_RELEASE_DISPLAY")
                    .unwrap_or_else(|| DEFAULT_RELEASE_DISPLAY.to_string()),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }

        if self.store.backend == StoreBackend::Postgres {
            if self.database.url.is_empty() {
                anyhow::bail!("Database URL cannot be empty");
            }

            if self.database.max_connections == 0 {
                anyhow::bail!("Database max_connections must be greater than 0");
            }

            if self.database.min_connections > self.database.max_connections {
                anyhow::bail!(
                    "Database min_connections ({}) cannot be greater than max_connections ({})",
                    self.database.min_connections,
                    self.database.max_connections
                );
            }
        }

        if self.audit.query_timeout_secs == 0 {
            anyhow::bail!("Query timeout must be greater than 0");
        }

        if self.audit.release_flags.is_empty() {
            tracing::warn!("No release flags configured - the newly-released report will be empty");
        }

        if self.audit.release_date.is_none() && self.audit.oncokb_info_url.is_none() {
            tracing::warn!(
                "Neither CURA_RELEASE_DATE nor ONCOKB_INFO_URL is set - newly-released queries need an explicit 'since'"
            );
        }

        if self.cors.allowed_origins.is_empty() {
            tracing::warn!("No CORS origins configured - all origins will be allowed");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: DEFAULT_SERVER_HOST.to_string(),
                port: DEFAULT_SERVER_PORT,
                shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            },
            store: StoreConfig {
                backend: StoreBackend::default(),
            },
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                idle_timeout_secs: DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
            },
            cors: CorsConfig {
                allowed_origins: vec![DEFAULT_CORS_ALLOWED_ORIGIN.to_string()],
                allow_credentials: true,
            },
            audit: AuditConfig {
                query_timeout_secs: DEFAULT_QUERY_TIMEOUT_SECS,
                release_date: None,
                oncokb_info_url: None,
                oncokb_api_token: None,
                release_flags: parse_release_flags(DEFAULT_RELEASE_FLAGS).unwrap_or_default(),
                release_entity: DEFAULT_RELEASE_ENTITY,
                release_relation: DEFAULT_RELEASE_RELATION.to_string(),
                release_display: DEFAULT_RELEASE_DISPLAY.to_string(),
            },
        }
    }
}
