//! Binarize stage: global thresholding of node subimages.
//!
//! For every region or line, the engine provides a global threshold for
//! the node's cropped/masked subimage; the resulting black/white image is
//! stored in the image store and referenced from the node. Geometry and
//! text are never touched.

use std::time::Instant;

use tracing::{debug, warn};

use crate::core::config::ConfigValidator;
use crate::core::errors::{PipelineError, PipelineResult};
use crate::domain::tree::NodeData;
use crate::processors::raster;

use super::support::{effective_dpi, node_image, owning_page, run_detection};
use super::types::{SkipReason, StageReport};
use super::{StageContext, StageProcessor};
use crate::pipeline::config::BinarizeConfig;

/// Binarize stage processor.
#[derive(Debug, Default)]
pub struct BinarizeStage;

impl StageProcessor for BinarizeStage {
    type Config = BinarizeConfig;

    fn name(&self) -> &'static str {
        "binarize"
    }

    fn run(
        &self,
        ctx: &mut StageContext<'_>,
        config: &Self::Config,
    ) -> PipelineResult<StageReport> {
        config.validate()?;
        let start = Instant::now();
        let mut report = StageReport::new(self.name());

        let level = config.operation_level.as_level();
        let targets = ctx.doc.nodes_at_level(level);
        if targets.is_empty() {
            debug!("binarize: no nodes at {} level", level);
            return Ok(report.finish(start));
        }

        let mut prepared = Vec::with_capacity(targets.len());
        for id in targets {
            let (_, page_attrs) = owning_page(ctx.doc, id)?;
            if effective_dpi(config.dpi, &page_attrs).is_none() && ctx.engine.needs_dpi() {
                warn!("binarize: skipping {}: resolution unknown", id);
                report.record_skip(id, SkipReason::MissingDpi(format!("node {}", id)));
                continue;
            }
            match node_image(ctx.doc, ctx.images, id) {
                Ok(image) => prepared.push((id, image)),
                Err(error) => match SkipReason::from_error(&error) {
                    Some(reason) => {
                        warn!("binarize: skipping {}: {}", id, reason);
                        report.record_skip(id, reason);
                    }
                    None => return Err(error),
                },
            }
        }

        let engine = ctx.engine;
        let results = run_detection(ctx.strategy, prepared, |_, image| {
            let threshold = engine.binarize_threshold(image)?;
            Ok((threshold, raster::apply_threshold(image, threshold)))
        });

        for (id, result) in results {
            match result {
                Ok((threshold, binary)) => {
                    let (_, page_attrs) = owning_page(ctx.doc, id)?;
                    let reference = ctx.images.insert_derived(
                        &page_attrs.image,
                        &format!("bin-{}", id),
                        binary,
                    );
                    debug!(
                        "binarize: node {} thresholded at {} into {}",
                        id, threshold, reference
                    );
                    match ctx.doc.data_mut(id)? {
                        NodeData::Region(attrs) => attrs.binarized = Some(reference),
                        NodeData::Line(attrs) => attrs.binarized = Some(reference),
                        _ => {
                            return Err(PipelineError::structural(format!(
                                "binarize selected non-region, non-line node {}",
                                id
                            )));
                        }
                    }
                    report.record_success();
                }
                Err(error) => match SkipReason::from_error(&error) {
                    Some(reason) => {
                        warn!("binarize: skipping {}: {}", id, reason);
                        report.record_skip(id, reason);
                    }
                    None => return Err(error),
                },
            }
        }

        Ok(report.finish(start))
    }
}
