//! Segment-line stage: text line detection inside text regions.

use std::time::Instant;

use tracing::{debug, warn};

use crate::core::config::ConfigValidator;
use crate::core::errors::PipelineResult;
use crate::domain::level::Level;
use crate::domain::overwrite::prepare_children;
use crate::domain::tree::{LineAttrs, NodeData};

use super::support::{node_image, run_detection};
use super::types::{SkipReason, StageReport};
use super::{StageContext, StageProcessor};
use crate::pipeline::config::SegmentLineConfig;

/// Segment-line stage processor.
#[derive(Debug, Default)]
pub struct SegmentLineStage;

impl StageProcessor for SegmentLineStage {
    type Config = SegmentLineConfig;

    fn name(&self) -> &'static str {
        "segment-line"
    }

    fn run(
        &self,
        ctx: &mut StageContext<'_>,
        config: &Self::Config,
    ) -> PipelineResult<StageReport> {
        config.validate()?;
        let start = Instant::now();
        let mut report = StageReport::new(self.name());

        let regions: Vec<_> = ctx
            .doc
            .nodes_at_level(Level::Region)
            .into_iter()
            .filter(|&id| {
                matches!(
                    ctx.doc.get(id).map(|n| &n.data),
                    Some(NodeData::Region(attrs)) if attrs.kind.is_text()
                )
            })
            .collect();
        if regions.is_empty() {
            debug!("segment-line: document has no text regions");
            return Ok(report.finish(start));
        }

        let mut prepared = Vec::with_capacity(regions.len());
        for region in regions {
            if !config.overwrite_lines && ctx.doc.has_children(region) {
                debug!("segment-line: keeping existing lines in region {}", region);
                report.record_skip(region, SkipReason::AlreadySegmented(Level::Line));
                continue;
            }
            match node_image(ctx.doc, ctx.images, region) {
                Ok(image) => prepared.push((region, image)),
                Err(error) => match SkipReason::from_error(&error) {
                    Some(reason) => {
                        warn!("segment-line: skipping region {}: {}", region, reason);
                        report.record_skip(region, reason);
                    }
                    None => return Err(error),
                },
            }
        }

        let engine = ctx.engine;
        let results = run_detection(ctx.strategy, prepared, |_, image| {
            engine.detect_lines(image)
        });

        for (region, result) in results {
            let lines = match result {
                Ok(lines) => lines,
                Err(error) => match SkipReason::from_error(&error) {
                    Some(reason) => {
                        warn!("segment-line: skipping region {}: {}", region, reason);
                        report.record_skip(region, reason);
                        continue;
                    }
                    None => return Err(error),
                },
            };

            match prepare_children(ctx.doc, region, Level::Line, config.overwrite_lines) {
                Ok(_) => {}
                Err(error) => match SkipReason::from_error(&error) {
                    Some(reason) => {
                        report.record_skip(region, reason);
                        continue;
                    }
                    None => return Err(error),
                },
            }

            let bounds = ctx.doc.node_bounds(region)?;
            let offset = (bounds.x0.floor().max(0.0), bounds.y0.floor().max(0.0));
            let children: Vec<NodeData> = lines
                .into_iter()
                .map(|geometry| geometry.translate(offset.0, offset.1))
                .filter(|geometry| !geometry.is_degenerate())
                .map(|geometry| NodeData::Line(LineAttrs::new(geometry)))
                .collect();

            let count = children.len();
            ctx.doc.attach_children(region, children)?;
            debug!("segment-line: region {} has {} lines", region, count);
            report.record_success();
        }

        Ok(report.finish(start))
    }
}
