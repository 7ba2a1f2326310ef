//! Amazon S3 (or S3-compatible) object store.

use async_trait::async_trait;
use aws_sdk_s3::{Client, primitives::ByteStream};
use bytes::Bytes;
use tracing::debug;

use crate::application::store::{ObjectStore, StoreError};

#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: Client,
}

/// Connection options for [`S3ObjectStore::connect`].
#[derive(Debug, Clone, Default)]
pub struct S3Options {
    pub region: String,
    pub endpoint_url: Option<String>,
    pub force_path_style: bool,
}

impl S3ObjectStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from the ambient AWS credential chain.
    pub async fn connect(options: &S3Options) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(options.region.clone()));
        if let Some(endpoint) = options.endpoint_url.as_deref() {
            loader = loader.endpoint_url(endpoint);
        }
        let shared = loader.load().await;

        let config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(options.force_path_style)
            .build();
        Self::new(Client::from_conf(config))
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), StoreError> {
        let size = body.len();
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|err| StoreError::backend(aws_sdk_s3::error::DisplayErrorContext(err)))?;

        debug!(
            target = "infra::storage::s3",
            bucket,
            key,
            size_bytes = size,
            "object stored"
        );
        Ok(())
    }
}
