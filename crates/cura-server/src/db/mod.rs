//! PostgreSQL connection pool

use crate::config::DatabaseConfig;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use thiserror::Error;

/// Database setup errors
#[derive(Error, Debug)]
pub enum DbError {
    /// SQL query or connection error
    #[error("Database query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Database configuration is invalid or missing
    #[error("Database configuration error: {0}. Check DATABASE_URL and connection settings.")]
    Config(String),
}

pub type DbResult<T> = Result<T, DbError>;

pub fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
    let mut options = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs));

    if config.idle_timeout_secs > 0 {
        options = options.idle_timeout(Duration::from_secs(config.idle_timeout_secs));
    }

    options
}

pub async fn create_pool(config: &DatabaseConfig) -> DbResult<PgPool> {
    if config.url.trim().is_empty() {
        return Err(DbError::Config("DATABASE_URL is empty".to_string()));
    }

    let pool = pool_options(config).connect(&config.url).await?;

    tracing::info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "Database connection pool created"
    );

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str) -> DatabaseConfig {
        DatabaseConfig {
            url: url.to_string(),
            max_connections: 4,
            min_connections: 1,
            connect_timeout_secs: 5,
            idle_timeout_secs: 0,
        }
    }

    #[test]
    fn test_pool_options() {
        let options = pool_options(&config("postgresql://localhost/cura"));
        assert_eq!(options.get_max_connections(), 4);
        assert_eq!(options.get_min_connections(), 1);
        assert_eq!(options.get_acquire_timeout(), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_empty_url_is_rejected() {
        let result = create_pool(&config("  ")).await;
        assert!(matches!(result, Err(DbError::Config(_))));
    }
}
