//! The level-overwrite policy.
//!
//! Every re-segmentation stage funnels through one rule, parameterized by
//! the hierarchy level it writes: with its overwrite flag set, the stale
//! subtree below the receiving node is detached and discarded before new
//! results are inserted; without it, a node that already carries children
//! at the target level reports [`PipelineError::AlreadySegmented`], which
//! stages treat as a node-local skip. This models the per-stage flags
//! (`overwrite_regions`, `overwrite_lines`, `overwrite_words`) uniformly.

use tracing::debug;

use crate::core::errors::{PipelineError, PipelineResult};
use crate::domain::level::Level;
use crate::domain::tree::{Document, NodeId};

/// Prepares `parent` to receive freshly detected children at `level`.
///
/// Returns the number of nodes pruned. With `overwrite` unset, a parent
/// that already has children fails with `AlreadySegmented`; callers skip
/// the node and record the reason, which makes re-running a segmentation
/// stage without overwrite an idempotent no-op.
pub fn prepare_children(
    doc: &mut Document,
    parent: NodeId,
    level: Level,
    overwrite: bool,
) -> PipelineResult<usize> {
    if overwrite {
        let removed = doc.detach_children(parent)?;
        if !removed.is_empty() {
            debug!(
                "removed {} stale nodes at or below {} level under {}",
                removed.len(),
                level,
                parent
            );
        }
        return Ok(removed.len());
    }

    if doc.has_children(parent) {
        return Err(PipelineError::already_segmented(
            level.as_str(),
            format!("node {} already has children", parent),
        ));
    }

    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::tree::{
        Document, ImageRef, LineAttrs, NodeData, PageAttrs, RegionAttrs, RegionKind, WordAttrs,
    };
    use crate::processors::geometry::{BoundingBox, Geometry};

    fn seeded_page() -> (Document, NodeId) {
        let mut doc = Document::new();
        let page = doc.add_page(PageAttrs::new(ImageRef::new("p.png"), 600, 400));
        let region = doc
            .attach_children(
                page,
                vec![NodeData::Region(RegionAttrs::new(
                    Geometry::Rect(BoundingBox::new(0.0, 0.0, 600.0, 200.0)),
                    RegionKind::Text,
                ))],
            )
            .unwrap()[0];
        let line = doc
            .attach_children(
                region,
                vec![NodeData::Line(LineAttrs::new(Geometry::Rect(
                    BoundingBox::new(0.0, 0.0, 600.0, 40.0),
                )))],
            )
            .unwrap()[0];
        doc.attach_children(
            line,
            vec![NodeData::Word(WordAttrs::new(Geometry::Rect(
                BoundingBox::new(0.0, 0.0, 80.0, 40.0),
            )))],
        )
        .unwrap();
        (doc, page)
    }

    #[test]
    fn test_overwrite_prunes_deep_subtree() {
        // A page with regions-with-lines-with-words loses all of them; no
        // orphaned lines survive.
        let (mut doc, page) = seeded_page();
        let removed = prepare_children(&mut doc, page, Level::Region, true).unwrap();
        assert_eq!(removed, 3);
        assert!(doc.nodes_at_level(Level::Region).is_empty());
        assert!(doc.nodes_at_level(Level::Line).is_empty());
        assert!(doc.nodes_at_level(Level::Word).is_empty());
    }

    #[test]
    fn test_no_overwrite_reports_already_segmented() {
        let (mut doc, page) = seeded_page();
        let err = prepare_children(&mut doc, page, Level::Region, false).unwrap_err();
        assert!(matches!(err, PipelineError::AlreadySegmented { .. }));
        assert!(err.is_node_local());
        // the existing structure is untouched
        assert_eq!(doc.nodes_at_level(Level::Word).len(), 1);
    }

    #[test]
    fn test_no_overwrite_on_empty_parent_is_fine() {
        let mut doc = Document::new();
        let page = doc.add_page(PageAttrs::new(ImageRef::new("p.png"), 600, 400));
        assert_eq!(
            prepare_children(&mut doc, page, Level::Region, false).unwrap(),
            0
        );
    }
}
