//! End-to-end signature processing: parse, bind, upload assets, rewrite, upload document.
//!
//! Assets are written before the document and the document is only written
//! when every asset landed, so a stored signature never points at a missing
//! image. A failed document write after successful asset writes leaves the
//! assets orphaned; that case is reported, not retried.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::{StreamExt, stream};
use metrics::{counter, histogram};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::domain::{
    error::DomainError,
    layout::DOCUMENT_CONTENT_TYPE,
    signature::{BoundAsset, SignatureRequest, SignatureResult, SlotIndex},
};

use super::binder::{self, AssetBinder};
use super::markup::{self, MarkupError};
use super::store::{ObjectStore, StoreError};

const SOURCE: &str = "application::pipeline";

pub const DEFAULT_UPLOAD_CONCURRENCY: usize = 4;
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(30);

/// One asset that could not be written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotFailure {
    pub slot: SlotIndex,
    pub key: String,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{message}")]
    Validation { message: String },
    #[error("markup could not be parsed: {0}")]
    MalformedMarkup(#[from] MarkupError),
    #[error("failed to upload images for slots {}", SlotList(.failures))]
    PartialUpload { failures: Vec<SlotFailure> },
    #[error("images uploaded but signature document `{path}` could not be stored")]
    DocumentPersist {
        path: String,
        #[source]
        source: StoreError,
    },
    #[error("pipeline invariant violated: {message}")]
    Invariant { message: String },
}

impl PipelineError {
    /// Short label used for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Validation { .. } => "validation",
            PipelineError::MalformedMarkup(_) => "malformed_markup",
            PipelineError::PartialUpload { .. } => "partial_upload",
            PipelineError::DocumentPersist { .. } => "document_persist",
            PipelineError::Invariant { .. } => "invariant",
        }
    }

    /// Slots whose upload failed, empty for other failure kinds.
    pub fn failed_slots(&self) -> Vec<SlotIndex> {
        match self {
            PipelineError::PartialUpload { failures } => {
                failures.iter().map(|failure| failure.slot).collect()
            }
            _ => Vec::new(),
        }
    }
}

impl From<DomainError> for PipelineError {
    fn from(error: DomainError) -> Self {
        match error {
            DomainError::Validation { message } => PipelineError::Validation { message },
            DomainError::Invariant { message } => PipelineError::Invariant { message },
        }
    }
}

struct SlotList<'a>(&'a [SlotFailure]);

impl fmt::Display for SlotList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, failure) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", failure.slot)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    pub upload_concurrency: NonZeroUsize,
    pub store_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            upload_concurrency: NonZeroUsize::new(DEFAULT_UPLOAD_CONCURRENCY)
                .unwrap_or(NonZeroUsize::MIN),
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }
}

#[derive(Clone)]
pub struct SignaturePipeline {
    store: Arc<dyn ObjectStore>,
    binder: AssetBinder,
    settings: PipelineSettings,
}

impl SignaturePipeline {
    pub fn new(store: Arc<dyn ObjectStore>, binder: AssetBinder, settings: PipelineSettings) -> Self {
        Self {
            store,
            binder,
            settings,
        }
    }

    pub async fn process(&self, request: SignatureRequest) -> Result<SignatureResult, PipelineError> {
        let started = Instant::now();
        let outcome = self.run(request).await;

        let label = match &outcome {
            Ok(_) => "success",
            Err(err) => err.kind(),
        };
        counter!("sigrelay_signature_requests_total", "outcome" => label).increment(1);
        histogram!("sigrelay_pipeline_ms").record(started.elapsed().as_secs_f64() * 1_000.0);

        outcome
    }

    async fn run(&self, request: SignatureRequest) -> Result<SignatureResult, PipelineError> {
        request.validate()?;

        let SignatureRequest {
            markup,
            owner_email,
            owner_id,
            images,
        } = request;

        let mut document = markup::parse(&markup)?;
        let binding = self.binder.bind(&owner_id, images, &document)?;
        debug!(
            target = SOURCE,
            owner_id = owner_id.as_str(),
            assets = binding.assets.len(),
            substitutions = binding.substitutions.len(),
            elements = document.len(),
            "bound uploaded images to markup"
        );

        let failures = self.upload_assets(&binding.assets).await;
        counter!("sigrelay_assets_uploaded_total")
            .increment((binding.assets.len() - failures.len()) as u64);
        if !failures.is_empty() {
            counter!("sigrelay_asset_upload_failures_total").increment(failures.len() as u64);
            warn!(
                target = SOURCE,
                owner_id = owner_id.as_str(),
                failed = failures.len(),
                total = binding.assets.len(),
                "asset uploads failed; signature document not written"
            );
            return Err(PipelineError::PartialUpload { failures });
        }

        let substitutions = binder::apply(&binding, &mut document)?;
        let rendered = markup::serialize(&document)?;

        let layout = self.binder.layout();
        let document_key = layout.document_key(&owner_email);
        let document_path = layout.document_path(&document_key);

        if let Err(source) = put_with_timeout(
            self.store.as_ref(),
            self.settings.store_timeout,
            layout.document_bucket(),
            &document_key,
            Bytes::from(rendered),
            DOCUMENT_CONTENT_TYPE,
        )
        .await
        {
            error!(
                target = SOURCE,
                error = %source,
                path = document_path.as_str(),
                orphaned_assets = binding.assets.len(),
                "signature document upload failed after assets were stored"
            );
            return Err(PipelineError::DocumentPersist {
                path: document_path,
                source,
            });
        }

        let asset_paths = binding
            .assets
            .iter()
            .map(|asset| layout.asset_path(&asset.storage_key))
            .collect();

        info!(
            target = SOURCE,
            owner_id = owner_id.as_str(),
            images = binding.assets.len(),
            substitutions,
            path = document_path.as_str(),
            "signature processed"
        );

        Ok(SignatureResult {
            images_uploaded: binding.assets.len(),
            asset_paths,
            document_path,
            substitutions,
        })
    }

    /// Upload every asset, collecting all failures instead of stopping at the first.
    ///
    /// Each upload future owns its inputs so the fan-out stays `Send + 'static`.
    async fn upload_assets(&self, assets: &[BoundAsset]) -> Vec<SlotFailure> {
        let bucket: Arc<str> = Arc::from(self.binder.layout().asset_bucket());
        let jobs: Vec<AssetUpload> = assets.iter().map(AssetUpload::from).collect();
        let store = Arc::clone(&self.store);
        let timeout = self.settings.store_timeout;

        stream::iter(jobs)
            .map(move |job| {
                let store = Arc::clone(&store);
                let bucket = Arc::clone(&bucket);
                async move {
                    put_with_timeout(
                        store.as_ref(),
                        timeout,
                        &bucket,
                        &job.key,
                        job.body,
                        &job.content_type,
                    )
                    .await
                    .map_err(|err| {
                        warn!(
                            target = SOURCE,
                            error = %err,
                            slot = job.slot.get(),
                            key = job.key.as_str(),
                            "asset upload failed"
                        );
                        SlotFailure {
                            slot: job.slot,
                            key: job.key,
                            message: err.to_string(),
                        }
                    })
                }
            })
            .buffered(self.settings.upload_concurrency.get())
            .filter_map(|result| async move { result.err() })
            .collect()
            .await
    }
}

/// Owned inputs of one asset upload.
struct AssetUpload {
    slot: SlotIndex,
    key: String,
    body: Bytes,
    content_type: String,
}

impl From<&BoundAsset> for AssetUpload {
    fn from(asset: &BoundAsset) -> Self {
        Self {
            slot: asset.slot(),
            key: asset.storage_key.clone(),
            body: asset.blob.bytes.clone(),
            content_type: asset.blob.content_type().to_string(),
        }
    }
}

async fn put_with_timeout(
    store: &dyn ObjectStore,
    timeout: Duration,
    bucket: &str,
    key: &str,
    body: Bytes,
    content_type: &str,
) -> Result<(), StoreError> {
    match tokio::time::timeout(timeout, store.put(bucket, key, body, content_type)).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout {
            seconds: timeout.as_secs(),
        }),
    }
}
