//! Object store backends.

pub mod filesystem;
pub mod memory;
pub mod s3;

use std::sync::Arc;

use crate::application::store::ObjectStore;
use crate::config::{StorageBackend, StorageSettings};

use super::error::InfraError;

pub use filesystem::FilesystemObjectStore;
pub use memory::InMemoryObjectStore;
pub use s3::{S3ObjectStore, S3Options};

/// Construct the configured backend.
pub async fn build_object_store(
    settings: &StorageSettings,
) -> Result<Arc<dyn ObjectStore>, InfraError> {
    let store: Arc<dyn ObjectStore> = match settings.backend {
        StorageBackend::S3 => {
            let options = S3Options {
                region: settings.region.clone(),
                endpoint_url: settings.endpoint_url.clone(),
                force_path_style: settings.force_path_style,
            };
            Arc::new(S3ObjectStore::connect(&options).await)
        }
        StorageBackend::Filesystem => {
            Arc::new(FilesystemObjectStore::new(settings.filesystem_root.clone())?)
        }
        StorageBackend::Memory => Arc::new(InMemoryObjectStore::new()),
    };
    Ok(store)
}
