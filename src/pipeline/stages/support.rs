//! Helper utilities shared by the stage processors.

use image::RgbImage;
use rayon::prelude::*;

use crate::core::errors::{PipelineError, PipelineResult};
use crate::domain::tree::{Document, NodeData, NodeId, PageAttrs};
use crate::pipeline::images::ImageStore;
use crate::processors::raster;

use super::types::ProcessingStrategy;

/// Extracts the subimage a node covers, in page coordinates.
///
/// Pages yield their working rectangle (the border when one is set);
/// other nodes are cropped to their geometry envelope, with pixels
/// outside a native polygon masked to background. Degenerate geometries
/// fail with a node-local geometry error.
pub fn node_image(
    doc: &Document,
    images: &mut ImageStore,
    id: NodeId,
) -> PipelineResult<RgbImage> {
    let page = doc.page_of(id)?;
    let page_image = match &doc.node(page)?.data {
        NodeData::Page(attrs) => images.resolve(&attrs.image)?,
        _ => unreachable!("page_of returns a page node"),
    };

    let node = doc.node(id)?;
    match &node.data {
        NodeData::Page(attrs) => raster::crop(&page_image, &attrs.bounds()),
        data => {
            let geometry = data.geometry().expect("non-page nodes carry geometry");
            if geometry.is_degenerate() {
                return Err(PipelineError::geometry(format!(
                    "node {} has degenerate geometry",
                    id
                )));
            }
            if geometry.is_polygon() {
                raster::mask(&page_image, &geometry.polygon())
            } else {
                raster::crop(&page_image, &geometry.bbox())
            }
        }
    }
}

/// Resolves the effective pixel density for a node's page.
///
/// A non-negative stage override wins over image metadata; a negative
/// override defers to the page's annotated DPI.
pub fn effective_dpi(override_dpi: f32, page: &PageAttrs) -> Option<f32> {
    if override_dpi >= 0.0 {
        Some(override_dpi)
    } else {
        page.dpi
    }
}

/// Page attributes of the page owning `id`.
pub fn owning_page(doc: &Document, id: NodeId) -> PipelineResult<(NodeId, PageAttrs)> {
    let page = doc.page_of(id)?;
    match &doc.node(page)?.data {
        NodeData::Page(attrs) => Ok((page, attrs.clone())),
        _ => unreachable!("page_of returns a page node"),
    }
}

/// Runs one engine call per prepared node, in parallel when the strategy
/// allows it. Results keep the input order; tree mutation stays with the
/// caller, which applies it serially afterwards.
pub fn run_detection<I, T, F>(
    strategy: ProcessingStrategy,
    items: Vec<(NodeId, I)>,
    detect: F,
) -> Vec<(NodeId, PipelineResult<T>)>
where
    I: Send,
    T: Send,
    F: Fn(NodeId, &I) -> PipelineResult<T> + Send + Sync,
{
    if strategy.should_use_parallel(items.len()) {
        items
            .into_par_iter()
            .map(|(id, image)| {
                let result = detect(id, &image);
                (id, result)
            })
            .collect()
    } else {
        items
            .into_iter()
            .map(|(id, image)| {
                let result = detect(id, &image);
                (id, result)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::tree::{ImageRef, RegionAttrs, RegionKind};
    use crate::processors::geometry::{BoundingBox, Geometry};

    fn store_with_page(doc: &mut Document) -> (ImageStore, NodeId) {
        let reference = ImageRef::new("page.png");
        let mut store = ImageStore::new();
        store.insert(reference.clone(), RgbImage::new(200, 100));
        let page = doc.add_page(PageAttrs::new(reference, 200, 100));
        (store, page)
    }

    #[test]
    fn test_node_image_crops_region() {
        let mut doc = Document::new();
        let (mut store, page) = store_with_page(&mut doc);
        let region = doc
            .attach_children(
                page,
                vec![NodeData::Region(RegionAttrs::new(
                    Geometry::Rect(BoundingBox::new(10.0, 10.0, 60.0, 40.0)),
                    RegionKind::Text,
                ))],
            )
            .unwrap()[0];
        let image = node_image(&doc, &mut store, region).unwrap();
        assert_eq!(image.dimensions(), (50, 30));
    }

    #[test]
    fn test_node_image_degenerate_geometry_is_node_local() {
        let mut doc = Document::new();
        let (mut store, page) = store_with_page(&mut doc);
        let region = doc
            .attach_children(
                page,
                vec![NodeData::Region(RegionAttrs::new(
                    Geometry::Rect(BoundingBox::new(10.0, 10.0, 10.0, 40.0)),
                    RegionKind::Text,
                ))],
            )
            .unwrap()[0];
        let err = node_image(&doc, &mut store, region).unwrap_err();
        assert!(err.is_node_local());
    }

    #[test]
    fn test_node_image_uses_page_border() {
        let mut doc = Document::new();
        let (mut store, page) = store_with_page(&mut doc);
        if let NodeData::Page(attrs) = doc.data_mut(page).unwrap() {
            attrs.border = Some(BoundingBox::new(20.0, 10.0, 120.0, 90.0));
        }
        let image = node_image(&doc, &mut store, page).unwrap();
        assert_eq!(image.dimensions(), (100, 80));
    }

    #[test]
    fn test_effective_dpi_override() {
        let mut attrs = PageAttrs::new(ImageRef::new("p.png"), 10, 10);
        attrs.dpi = Some(300.0);
        assert_eq!(effective_dpi(72.0, &attrs), Some(72.0));
        assert_eq!(effective_dpi(-1.0, &attrs), Some(300.0));
        attrs.dpi = None;
        assert_eq!(effective_dpi(-1.0, &attrs), None);
    }
}
