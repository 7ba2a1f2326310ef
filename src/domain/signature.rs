//! Signature submission values and their invariants.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use bytes::Bytes;
use serde::Serialize;
use url::Url;

use super::error::DomainError;

/// Content type stored for images whose MIME type was not declared.
pub const DEFAULT_IMAGE_CONTENT_TYPE: &str = "image/png";

/// Multipart field prefix carrying the slot index of an image.
pub const IMAGE_FIELD_PREFIX: &str = "image_";

/// Zero-based ordinal binding an uploaded image to the n-th `<img>` element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct SlotIndex(usize);

impl SlotIndex {
    pub const fn new(value: usize) -> Self {
        Self(value)
    }

    pub const fn get(self) -> usize {
        self.0
    }

    /// Parse a multipart field name such as `image_3`.
    ///
    /// Returns `Ok(None)` for names outside the `image_` namespace and an error
    /// when the suffix is not a plain decimal integer.
    pub fn from_field_name(name: &str) -> Result<Option<Self>, DomainError> {
        let Some(suffix) = name.strip_prefix(IMAGE_FIELD_PREFIX) else {
            return Ok(None);
        };
        if suffix.is_empty() || !suffix.bytes().all(|byte| byte.is_ascii_digit()) {
            return Err(DomainError::validation(format!(
                "image field `{name}` must be named image_<N>"
            )));
        }
        suffix
            .parse::<usize>()
            .map(|value| Some(Self(value)))
            .map_err(|_| DomainError::validation(format!("image field `{name}` is out of range")))
    }
}

impl fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One uploaded image, held fully in memory for the lifetime of a request.
#[derive(Debug, Clone)]
pub struct NamedBlob {
    pub slot: SlotIndex,
    pub filename: String,
    pub bytes: Bytes,
    pub mime_type: Option<String>,
}

impl NamedBlob {
    /// Content type recorded in storage for this image.
    pub fn content_type(&self) -> &str {
        self.mime_type
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(DEFAULT_IMAGE_CONTENT_TYPE)
    }
}

/// Transport-independent input to the signature pipeline.
#[derive(Debug, Clone, Default)]
pub struct SignatureRequest {
    pub markup: String,
    pub owner_email: String,
    pub owner_id: String,
    pub images: Vec<NamedBlob>,
}

impl SignatureRequest {
    /// Check required fields and slot contiguity before any I/O happens.
    pub fn validate(&self) -> Result<(), DomainError> {
        let missing: Vec<&str> = [
            ("html", self.markup.as_str()),
            ("advisorEmail", self.owner_email.as_str()),
            ("userId", self.owner_id.as_str()),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(name, _)| name)
        .collect();

        if !missing.is_empty() {
            return Err(DomainError::validation(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        }

        if is_dot_segment(&self.owner_id) {
            return Err(DomainError::validation(format!(
                "userId `{}` is not a valid path segment",
                self.owner_id
            )));
        }

        let mut seen = BTreeSet::new();
        let mut filenames: BTreeMap<&str, SlotIndex> = BTreeMap::new();
        for image in &self.images {
            if image.filename.is_empty() {
                return Err(DomainError::validation(format!(
                    "image slot {} has no filename",
                    image.slot
                )));
            }
            if is_dot_segment(&image.filename) {
                return Err(DomainError::validation(format!(
                    "image slot {} has reserved filename `{}`",
                    image.slot, image.filename
                )));
            }
            if !seen.insert(image.slot) {
                return Err(DomainError::validation(format!(
                    "image slot {} was supplied more than once",
                    image.slot
                )));
            }
            // Same owner and filename means same storage key.
            if let Some(first) = filenames.insert(image.filename.as_str(), image.slot) {
                let (first, second) = (first.min(image.slot), first.max(image.slot));
                return Err(DomainError::validation(format!(
                    "image slots {first} and {second} share filename `{}`",
                    image.filename
                )));
            }
        }

        if let Some(gap) = (0..self.images.len())
            .map(SlotIndex::new)
            .find(|slot| !seen.contains(slot))
        {
            return Err(DomainError::validation(format!(
                "image slots must be contiguous from 0; slot {gap} is missing"
            )));
        }

        Ok(())
    }
}

fn is_dot_segment(value: &str) -> bool {
    matches!(value, "." | "..")
}

/// An image paired with its storage key and the public URL addressing it.
#[derive(Debug, Clone)]
pub struct BoundAsset {
    pub blob: NamedBlob,
    pub storage_key: String,
    pub public_url: Url,
}

impl BoundAsset {
    pub fn slot(&self) -> SlotIndex {
        self.blob.slot
    }
}

/// Summary returned after both persistence phases succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignatureResult {
    pub images_uploaded: usize,
    pub asset_paths: Vec<String>,
    pub document_path: String,
    pub substitutions: usize,
}
