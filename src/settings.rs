//! Engine settings from environment, and pool construction.

use crate::error::{AppError, StorageContext};
use crate::ident::sanitize_identifier;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{ConnectOptions, PgPool};
use std::str::FromStr;
use std::time::Duration;

const MAX_LIST_LIMIT: u32 = 1000;
const MAX_DETAIL_LIMIT: u32 = 100;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub database_url: String,
    /// Schema holding both catalog tables and module tables.
    pub schema: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    /// Upper bound for any single engine operation against the store.
    pub request_timeout: Duration,
    pub list_limit: u32,
    pub detail_limit: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            schema: "metamodule".into(),
            max_connections: 10,
            acquire_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            list_limit: 100,
            detail_limit: 10,
        }
    }
}

impl EngineConfig {
    /// Read settings from the environment (after loading `.env` if present).
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| AppError::Validation("DATABASE_URL is not set".into()))?;
        let mut config = Self {
            database_url,
            ..Default::default()
        };
        if let Ok(schema) = std::env::var("METAMODULE_SCHEMA") {
            config = config.schema(&schema);
        }
        if let Some(n) = env_number("METAMODULE_MAX_CONNECTIONS")? {
            config.max_connections = n as u32;
        }
        if let Some(secs) = env_number("METAMODULE_ACQUIRE_TIMEOUT_SECS")? {
            config.acquire_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_number("METAMODULE_REQUEST_TIMEOUT_SECS")? {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = env_number("METAMODULE_LIST_LIMIT")? {
            config = config.list_limit(n as u32);
        }
        if let Some(n) = env_number("METAMODULE_DETAIL_LIMIT")? {
            config = config.detail_limit(n as u32);
        }
        Ok(config)
    }

    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = url.into();
        self
    }

    /// Schema names go through the same sanitizer as module names.
    pub fn schema(mut self, schema: &str) -> Self {
        self.schema = sanitize_identifier(schema).to_lowercase();
        self
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn list_limit(mut self, limit: u32) -> Self {
        self.list_limit = limit.clamp(1, MAX_LIST_LIMIT);
        self
    }

    pub fn detail_limit(mut self, limit: u32) -> Self {
        self.detail_limit = limit.clamp(1, MAX_DETAIL_LIMIT);
        self
    }

    /// Clamp a caller-supplied page size to the configured bound.
    pub fn effective_list_limit(&self, requested: Option<u32>) -> u32 {
        requested.unwrap_or(self.list_limit).clamp(1, MAX_LIST_LIMIT)
    }

    pub fn effective_detail_limit(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.detail_limit)
            .clamp(1, MAX_DETAIL_LIMIT)
    }
}

fn env_number(key: &str) -> Result<Option<u64>, AppError> {
    match std::env::var(key) {
        Ok(v) => v
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| AppError::Validation(format!("{} must be a non-negative integer", key))),
        Err(_) => Ok(None),
    }
}

/// Build the shared pool.
pub async fn connect(config: &EngineConfig) -> Result<PgPool, AppError> {
    let opts = PgConnectOptions::from_str(&config.database_url)
        .map_err(|e| AppError::Validation(format!("invalid DATABASE_URL: {}", e)))?;
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(Duration::from_secs(600))
        .connect_with(opts)
        .await
        .storage("connect")
}

/// Ensure the database in `database_url` exists; create it if not. Connects to the
/// default `postgres` database to run CREATE DATABASE. Call before creating the main pool.
pub async fn ensure_database_exists(database_url: &str) -> Result<(), AppError> {
    let (admin_url, db_name) = parse_db_name_from_url(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = PgConnectOptions::from_str(&admin_url)
        .map_err(|e| AppError::Validation(format!("invalid DATABASE_URL: {}", e)))?;
    let mut conn: sqlx::PgConnection = opts.connect().await.storage("connect admin database")?;
    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&db_name)
        .fetch_one(&mut conn)
        .await
        .storage("check database")?;
    if !exists.0 {
        let statement = format!("CREATE DATABASE {}", crate::ident::quoted(&db_name));
        sqlx::query(&statement)
            .execute(&mut conn)
            .await
            .map_err(|e| AppError::ddl("create database", &statement, e))?;
        tracing::info!(database = %db_name, "created database");
    }
    Ok(())
}

fn parse_db_name_from_url(url: &str) -> Result<(String, String), AppError> {
    let path_start = url
        .rfind('/')
        .ok_or_else(|| AppError::Validation("DATABASE_URL: no path".into()))?
        + 1;
    let path_and_query = url.get(path_start..).unwrap_or("");
    let db_name = path_and_query.split('?').next().unwrap_or("").trim();
    let base = url.get(..path_start).unwrap_or(url);
    Ok((format!("{}postgres", base), db_name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.schema, "metamodule");
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.list_limit, 100);
        assert_eq!(config.detail_limit, 10);
        assert!(config.database_url.is_empty());
    }

    #[test]
    fn test_builder_clamps_limits() {
        let config = EngineConfig::default().list_limit(50_000).detail_limit(0);
        assert_eq!(config.list_limit, 1000);
        assert_eq!(config.detail_limit, 1);
        assert_eq!(config.effective_list_limit(Some(5000)), 1000);
        assert_eq!(config.effective_list_limit(None), 1000);
        assert_eq!(config.effective_detail_limit(Some(7)), 7);
    }

    #[test]
    fn test_schema_is_sanitized() {
        let config = EngineConfig::default().schema("my app; drop");
        assert_eq!(config.schema, "my_app__drop");
    }

    #[test]
    fn test_parse_db_name_from_url() {
        let (admin, name) = parse_db_name_from_url("postgres://u:p@localhost:5432/modules?sslmode=disable").unwrap();
        assert_eq!(admin, "postgres://u:p@localhost:5432/postgres");
        assert_eq!(name, "modules");
    }
}
