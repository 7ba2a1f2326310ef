//! Object storage capability consumed by the signature pipeline.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object key `{key}` is not valid for this store")]
    InvalidKey { key: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("object store backend failed: {message}")]
    Backend { message: String },
    #[error("object store did not respond within {seconds}s")]
    Timeout { seconds: u64 },
}

impl StoreError {
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend {
            message: err.to_string(),
        }
    }
}

/// Write-only object storage. Writing an existing key replaces its content.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), StoreError>;
}
