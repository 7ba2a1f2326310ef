//! Filesystem-backed object store for local development.
//!
//! Objects land at `root/<bucket>/<key>` with a `<key>.meta.json` sidecar
//! holding the content type, size and checksum.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tokio::{fs, io::AsyncWriteExt};
use tracing::debug;

use crate::application::store::{ObjectStore, StoreError};

const METADATA_SUFFIX: &str = ".meta.json";

/// Sidecar metadata written next to each stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub content_type: String,
    pub size_bytes: u64,
    pub checksum: String,
    pub stored_at: String,
}

#[derive(Debug)]
pub struct FilesystemObjectStore {
    root: PathBuf,
}

impl FilesystemObjectStore {
    /// Initialise storage rooted at the provided directory, creating it if necessary.
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Read a stored object back. Used by tests and local tooling.
    pub async fn read(&self, bucket: &str, key: &str) -> Result<Bytes, StoreError> {
        let absolute = self.resolve(bucket, key)?;
        let data = fs::read(absolute).await?;
        Ok(Bytes::from(data))
    }

    pub async fn metadata(&self, bucket: &str, key: &str) -> Result<ObjectMetadata, StoreError> {
        let absolute = metadata_path(&self.resolve(bucket, key)?);
        let raw = fs::read(absolute).await?;
        serde_json::from_slice(&raw).map_err(StoreError::backend)
    }

    /// Resolve the absolute path of an object, refusing keys that escape the root.
    fn resolve(&self, bucket: &str, key: &str) -> Result<PathBuf, StoreError> {
        let mut absolute = self.root.clone();
        for (part, value) in [("bucket", bucket), ("key", key)] {
            let relative = Path::new(value);
            if value.is_empty()
                || relative.is_absolute()
                || relative.components().any(|component| {
                    matches!(
                        component,
                        Component::ParentDir | Component::Prefix(_) | Component::RootDir
                    )
                })
                || (part == "bucket" && relative.components().count() != 1)
            {
                return Err(StoreError::InvalidKey {
                    key: format!("{bucket}/{key}"),
                });
            }
            absolute.push(relative);
        }
        Ok(absolute)
    }
}

#[async_trait]
impl ObjectStore for FilesystemObjectStore {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), StoreError> {
        let absolute = self.resolve(bucket, key)?;
        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(&absolute).await?;
        file.write_all(&body).await?;
        file.flush().await?;

        let digest = Sha256::digest(&body);
        let metadata = ObjectMetadata {
            content_type: content_type.to_string(),
            size_bytes: body.len() as u64,
            checksum: hex::encode(digest.as_slice()),
            stored_at: OffsetDateTime::now_utc()
                .format(&Rfc3339)
                .map_err(StoreError::backend)?,
        };
        let encoded = serde_json::to_vec_pretty(&metadata).map_err(StoreError::backend)?;
        fs::write(metadata_path(&absolute), encoded).await?;

        debug!(
            target = "infra::storage::filesystem",
            path = %absolute.display(),
            size_bytes = metadata.size_bytes,
            "object stored"
        );
        Ok(())
    }
}

fn metadata_path(object: &Path) -> PathBuf {
    let mut name = object.as_os_str().to_os_string();
    name.push(METADATA_SUFFIX);
    PathBuf::from(name)
}
