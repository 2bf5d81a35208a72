//! Crop stage: page border detection.
//!
//! Runs border detection on the whole page image and replaces the page's
//! working rectangle with the detected extent expanded by `padding`
//! pixels on every side. Despite the family resemblance to the
//! segmentation stages, crop creates no regions.

use std::time::Instant;

use tracing::{debug, warn};

use crate::core::config::ConfigValidator;
use crate::core::errors::PipelineResult;
use crate::domain::level::Level;
use crate::domain::tree::NodeData;
use crate::processors::geometry::BoundingBox;

use super::support::{effective_dpi, run_detection};
use super::types::{SkipReason, StageReport};
use super::{StageContext, StageProcessor};
use crate::pipeline::config::CropConfig;

/// Crop stage processor.
#[derive(Debug, Default)]
pub struct CropStage;

impl StageProcessor for CropStage {
    type Config = CropConfig;

    fn name(&self) -> &'static str {
        "crop"
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
            debug!("crop: document has no pages");
            return Ok(report.finish(start));
        }

        let mut prepared = Vec::with_capacity(pages.len());
        for page in pages {
            let NodeData::Page(attrs) = &ctx.doc.node(page)?.data else {
                unreachable!("nodes_at_level(Page) returns pages");
            };
            if attrs.border.is_some() {
                warn!("crop: overwriting existing border of page {}", page);
            }
            if effective_dpi(config.dpi, attrs).is_none() && ctx.engine.needs_dpi() {
                warn!("crop: skipping page {}: resolution unknown", page);
                report.record_skip(page, SkipReason::MissingDpi(format!("page {}", page)));
                continue;
            }
            // Border detection looks at the full page raster, not the
            // current working rectangle.
            match ctx.images.resolve(&attrs.image) {
                Ok(image) => prepared.push((page, image)),
                Err(error) => match SkipReason::from_error(&error) {
                    Some(reason) => {
                        warn!("crop: skipping page {}: {}", page, reason);
                        report.record_skip(page, reason);
                    }
                    None => return Err(error),
                },
            }
        }

        let engine = ctx.engine;
        let results = run_detection(ctx.strategy, prepared, |_, image| {
            engine.detect_border(image)
        });

        for (page, result) in results {
            match result {
                Ok(detected) => {
                    let NodeData::Page(attrs) = ctx.doc.data_mut(page)? else {
                        unreachable!("nodes_at_level(Page) returns pages");
                    };
                    let page_rect =
                        BoundingBox::new(0.0, 0.0, attrs.width as f32, attrs.height as f32);
                    let padded = detected.expand(config.padding as f32);
                    match padded.intersection(&page_rect) {
                        Some(border) if !border.is_degenerate() => {
                            debug!("crop: page {} border set to {:?}", page, border);
                            attrs.border = Some(border);
                            report.record_success();
                        }
                        _ => {
                            warn!("crop: page {} has no valid printed extent", page);
                            report.record_skip(
                                page,
                                SkipReason::Geometry(format!(
                                    "detected border {:?} has no extent within the page",
                                    detected
                                )),
                            );
                        }
                    }
                }
                Err(error) => match SkipReason::from_error(&error) {
                    Some(reason) => {
                        warn!("crop: skipping page {}: {}", page, reason);
                        report.record_skip(page, reason);
                    }
                    None => return Err(error),
                },
            }
        }

        Ok(report.finish(start))
    }
}
