//! Per-run image store.
//!
//! Page nodes reference their raster by [`ImageRef`]; the buffers
//! themselves live here for the duration of a pipeline run. Source images
//! are lazily loaded from disk on first use; derived images (binarized
//! subimages) are inserted by stages under synthetic references and never
//! touch the filesystem.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use image::RgbImage;

use crate::core::errors::{PipelineError, PipelineResult};
use crate::domain::tree::ImageRef;
use crate::utils::load_image;

/// Image buffers for one pipeline run, keyed by reference.
#[derive(Debug, Default)]
pub struct ImageStore {
    root: Option<PathBuf>,
    images: HashMap<ImageRef, Arc<RgbImage>>,
}

impl ImageStore {
    /// Creates an empty store that resolves references as literal paths.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store resolving references relative to `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            images: HashMap::new(),
        }
    }

    /// Inserts an image under the given reference, replacing any previous
    /// buffer.
    pub fn insert(&mut self, reference: ImageRef, image: RgbImage) -> Arc<RgbImage> {
        let arc = Arc::new(image);
        self.images.insert(reference, Arc::clone(&arc));
        arc
    }

    /// Returns the buffer for a reference, if it is in the store.
    pub fn get(&self, reference: &ImageRef) -> Option<Arc<RgbImage>> {
        self.images.get(reference).cloned()
    }

    /// Returns the buffer for a reference, loading it from disk on first
    /// use.
    pub fn resolve(&mut self, reference: &ImageRef) -> PipelineResult<Arc<RgbImage>> {
        if let Some(image) = self.images.get(reference) {
            return Ok(Arc::clone(image));
        }
        let path = match &self.root {
            Some(root) => root.join(&reference.0),
            None => PathBuf::from(&reference.0),
        };
        if !path.exists() {
            return Err(PipelineError::detection_msg(format!(
                "image {} is not in the store and {} does not exist",
                reference,
                path.display()
            )));
        }
        let image = load_image(&path)?;
        Ok(self.insert(reference.clone(), image))
    }

    /// Stores an image derived from `base`, minting a synthetic
    /// reference.
    pub fn insert_derived(
        &mut self,
        base: &ImageRef,
        suffix: &str,
        image: RgbImage,
    ) -> ImageRef {
        let reference = base.derived(suffix);
        self.insert(reference.clone(), image);
        reference
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut store = ImageStore::new();
        let reference = ImageRef::new("page.png");
        store.insert(reference.clone(), RgbImage::new(4, 4));
        assert!(store.get(&reference).is_some());
        assert!(store.get(&ImageRef::new("other.png")).is_none());
    }

    #[test]
    fn test_derived_reference_is_distinct() {
        let mut store = ImageStore::new();
        let base = ImageRef::new("page.png");
        store.insert(base.clone(), RgbImage::new(4, 4));
        let derived = store.insert_derived(&base, "binarized", RgbImage::new(2, 2));
        assert_ne!(base, derived);
        assert_eq!(store.get(&derived).unwrap().width(), 2);
        assert_eq!(store.get(&base).unwrap().width(), 4);
    }

    #[test]
    fn test_resolve_missing_file_fails() {
        let mut store = ImageStore::new();
        let err = store
            .resolve(&ImageRef::new("/definitely/not/here.png"))
            .unwrap_err();
        assert!(err.is_node_local());
    }
}
