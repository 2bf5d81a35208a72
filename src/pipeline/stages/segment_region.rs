//! Segment-region stage: page-level layout detection.
//!
//! Region detection runs on each page's working rectangle; detected
//! outlines come back in crop-local coordinates and are translated into
//! page coordinates, optionally reduced to their envelopes, padded and
//! clipped before they replace the page's regions per the overwrite
//! policy at the region level.

use std::time::Instant;

use tracing::{debug, warn};

use crate::core::config::ConfigValidator;
use crate::core::errors::PipelineResult;
use crate::domain::hypotheses::RegionDetectionOptions;
use crate::domain::level::Level;
use crate::domain::overwrite::prepare_children;
use crate::domain::tree::{NodeData, RegionAttrs};
use crate::processors::geometry::Geometry;

use super::support::{node_image, run_detection};
use super::types::{SkipReason, StageReport};
use super::{StageContext, StageProcessor};
use crate::pipeline::config::SegmentRegionConfig;

/// Segment-region stage processor.
#[derive(Debug, Default)]
pub struct SegmentRegionStage;

impl StageProcessor for SegmentRegionStage {
    type Config = SegmentRegionConfig;

    fn name(&self) -> &'static str {
        "segment-region"
    }

    fn run(
        &self,
        ctx: &mut StageContext<'_>,
        config: &Self::Config,
    ) -> PipelineResult<StageReport> {
        config.validate()?;
        let start = Instant::now();
        let mut report = StageReport::new(self.name());

        let pages = ctx.doc.nodes_at_level(Level::Page);
        if pages.is_empty() {
            debug!("segment-region: document has no pages");
            return Ok(report.finish(start));
        }

        let mut prepared = Vec::with_capacity(pages.len());
        for page in pages {
            if !config.overwrite_regions && ctx.doc.has_children(page) {
                debug!("segment-region: keeping existing regions of page {}", page);
                report.record_skip(page, SkipReason::AlreadySegmented(Level::Region));
                continue;
            }
            match node_image(ctx.doc, ctx.images, page) {
                Ok(image) => prepared.push((page, image)),
                Err(error) => match SkipReason::from_error(&error) {
                    Some(reason) => {
                        warn!("segment-region: skipping page {}: {}", page, reason);
                        report.record_skip(page, reason);
                    }
                    None => return Err(error),
                },
            }
        }

        let opts = RegionDetectionOptions {
            sparse_text: config.sparse_text,
            find_tables: config.find_tables,
        };
        let engine = ctx.engine;
        let results = run_detection(ctx.strategy, prepared, |_, image| {
            engine.detect_regions(image, &opts)
        });

        for (page, result) in results {
            let hypotheses = match result {
                Ok(hypotheses) => hypotheses,
                Err(error) => match SkipReason::from_error(&error) {
                    Some(reason) => {
                        warn!("segment-region: skipping page {}: {}", page, reason);
                        report.record_skip(page, reason);
                        continue;
                    }
                    None => return Err(error),
                },
            };

            match prepare_children(ctx.doc, page, Level::Region, config.overwrite_regions) {
                Ok(_) => {}
                Err(error) => match SkipReason::from_error(&error) {
                    Some(reason) => {
                        report.record_skip(page, reason);
                        continue;
                    }
                    None => return Err(error),
                },
            }

            let bounds = ctx.doc.node_bounds(page)?;
            let offset = (bounds.x0.floor().max(0.0), bounds.y0.floor().max(0.0));
            let mut regions = Vec::with_capacity(hypotheses.len());
            for hypothesis in hypotheses {
                let geometry = hypothesis.geometry.translate(offset.0, offset.1);
                let geometry = if config.crop_polygons {
                    geometry
                } else {
                    Geometry::Rect(geometry.bbox())
                };
                let geometry = match geometry.pad(config.padding as f32, Some(&bounds)) {
                    Ok(geometry) => geometry,
                    Err(error) => {
                        warn!(
                            "segment-region: dropping detected region on page {}: {}",
                            page, error
                        );
                        continue;
                    }
                };
                if geometry.is_degenerate() {
                    debug!(
                        "segment-region: dropping degenerate detection on page {}",
                        page
                    );
                    continue;
                }
                regions.push(NodeData::Region(RegionAttrs::new(
                    geometry,
                    hypothesis.kind,
                )));
            }

            let count = regions.len();
            ctx.doc.attach_children(page, regions)?;
            debug!("segment-region: page {} has {} regions", page, count);
            report.record_success();
        }

        Ok(report.finish(start))
    }
}
