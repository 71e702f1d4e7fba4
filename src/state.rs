//! Shared state for every engine operation: the pool and the settings.
//!
//! Nothing about modules is cached here; every operation re-reads the catalog.

use crate::error::AppError;
use crate::ident::qualified;
use crate::settings::EngineConfig;
use sqlx::PgPool;
use std::future::Future;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<EngineConfig>,
}

impl AppState {
    pub fn new(pool: PgPool, config: EngineConfig) -> Self {
        AppState {
            pool,
            config: Arc::new(config),
        }
    }

    pub fn schema(&self) -> &str {
        &self.config.schema
    }

    /// Quoted, schema-qualified name of a catalog table.
    pub fn sys_table(&self, table: &str) -> String {
        qualified(&self.config.schema, table)
    }

    /// Run one store operation under the configured request timeout. Not retried.
    pub async fn bounded<T, F>(&self, operation: &str, fut: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, AppError>>,
    {
        match tokio::time::timeout(self.config.request_timeout, fut).await {
            Ok(res) => res,
            Err(_) => {
                tracing::warn!(operation, timeout = ?self.config.request_timeout, "operation timed out");
                Err(AppError::Timeout {
                    operation: operation.to_string(),
                })
            }
        }
    }
}
