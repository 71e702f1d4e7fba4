//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("validation: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),
    /// Wraps a driver failure. `statement` is only set for DDL, which never carries bound values.
    #[error("storage error in {operation}: {source}")]
    Storage {
        operation: String,
        statement: Option<String>,
        #[source]
        source: sqlx::Error,
    },
    #[error("timed out in {operation}")]
    Timeout { operation: String },
    #[error("document store: {0}")]
    Document(String),
}

impl AppError {
    /// Stable machine-readable code, also used by the error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::PermissionDenied(_) => "permission_denied",
            AppError::Unauthenticated(_) => "unauthenticated",
            AppError::Storage { .. } => "storage_error",
            AppError::Timeout { .. } => "timeout",
            AppError::Document(_) => "document_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            AppError::Document(_) => StatusCode::BAD_GATEWAY,
        }
    }

    pub(crate) fn ddl(operation: &str, statement: &str, source: sqlx::Error) -> Self {
        tracing::error!(operation, statement, error = %source, "ddl failed");
        AppError::Storage {
            operation: operation.to_string(),
            statement: Some(statement.to_string()),
            source,
        }
    }
}

/// Attach an operation label to driver errors.
pub trait StorageContext<T> {
    fn storage(self, operation: &str) -> Result<T, AppError>;
}

impl<T> StorageContext<T> for Result<T, sqlx::Error> {
    fn storage(self, operation: &str) -> Result<T, AppError> {
        self.map_err(|source| AppError::Storage {
            operation: operation.to_string(),
            statement: None,
            source,
        })
    }
}

/// Unique-index violations become `Conflict`; anything else stays a storage error.
pub(crate) fn conflict_on_unique(operation: &str, what: String) -> impl FnOnce(sqlx::Error) -> AppError + '_ {
    move |source| match &source {
        sqlx::Error::Database(db) if db.is_unique_violation() => AppError::Conflict(what),
        _ => AppError::Storage {
            operation: operation.to_string(),
            statement: None,
            source,
        },
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Driver messages stay in the logs; callers get the operation only.
        let message = match &self {
            AppError::Storage { operation, .. } => format!("storage error in {}", operation),
            other => other.to_string(),
        };
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code().to_string(),
                message,
                details: None,
            },
        };
        (status, Json(body)).into_response()
    }
}
