//! Document store collaborator used by FileRef fields.
//!
//! The engine never looks at file bytes; it keeps only the id the store hands back.

use crate::error::AppError;
use async_trait::async_trait;

#[derive(Clone, Debug)]
pub struct Upload {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub content_type: String,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Store the file under `module_name` and return its document id.
    async fn upload(&self, upload: Upload, module_name: &str) -> Result<String, AppError>;

    async fn viewer_url(&self, document_id: &str) -> Result<String, AppError>;
}
