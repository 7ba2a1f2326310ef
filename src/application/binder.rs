//! Positional binding of uploaded images to `<img>` elements.

use url::Url;

use crate::domain::{
    error::DomainError,
    layout::StorageLayout,
    signature::{BoundAsset, NamedBlob, SlotIndex},
};

use super::markup::{self, Document, ElementHandle, MarkupError};

const IMAGE_TAG: &str = "img";
const SOURCE_ATTRIBUTE: &str = "src";

/// Pending `src` rewrite for one element.
#[derive(Debug, Clone)]
pub struct Substitution {
    pub element: ElementHandle,
    pub slot: SlotIndex,
    pub public_url: Url,
}

#[derive(Debug, Clone, Default)]
pub struct Binding {
    /// Every uploaded image in slot order, bound to an element or not.
    pub assets: Vec<BoundAsset>,
    pub substitutions: Vec<Substitution>,
}

#[derive(Debug, Clone)]
pub struct AssetBinder {
    layout: StorageLayout,
}

impl AssetBinder {
    pub fn new(layout: StorageLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Pair the i-th image by slot with the i-th `<img>` in document order.
    ///
    /// Surplus images are still returned as assets so they get uploaded;
    /// surplus elements are left alone.
    pub fn bind(
        &self,
        owner_id: &str,
        mut images: Vec<NamedBlob>,
        doc: &Document,
    ) -> Result<Binding, DomainError> {
        images.sort_by_key(|image| image.slot);

        let assets = images
            .into_iter()
            .map(|blob| {
                let storage_key = self.layout.asset_key(owner_id, &blob.filename);
                let public_url = self.layout.public_url(owner_id, &blob.filename)?;
                Ok(BoundAsset {
                    blob,
                    storage_key,
                    public_url,
                })
            })
            .collect::<Result<Vec<_>, DomainError>>()?;

        let substitutions = markup::find_all(doc, IMAGE_TAG)
            .into_iter()
            .zip(assets.iter())
            .map(|(element, asset)| Substitution {
                element,
                slot: asset.slot(),
                public_url: asset.public_url.clone(),
            })
            .collect();

        Ok(Binding {
            assets,
            substitutions,
        })
    }
}

/// Write every substitution into the document, returning how many were applied.
pub fn apply(binding: &Binding, doc: &mut Document) -> Result<usize, MarkupError> {
    for substitution in &binding.substitutions {
        markup::set_attribute(
            doc,
            &substitution.element,
            SOURCE_ATTRIBUTE,
            substitution.public_url.as_str(),
        )?;
    }
    Ok(binding.substitutions.len())
}
