//! Deskew stage: orientation, skew and script annotation.
//!
//! For every selected page or region, the node subimage is handed to the
//! engine's orientation detector. The skew angle is recorded
//! unconditionally; the coarse orientation correction is applied only
//! when the engine's confidence reaches `min_orientation_confidence`, in
//! which case the node geometry is rotated and the orientation marked.

use std::time::Instant;

use tracing::{debug, warn};

use crate::core::config::ConfigValidator;
use crate::core::errors::{PipelineError, PipelineResult};
use crate::domain::hypotheses::OrientationHypothesis;
use crate::domain::level::Level;
use crate::domain::tree::{NodeData, NodeId};

use super::support::{effective_dpi, node_image, owning_page, run_detection};
use super::types::{SkipReason, StageReport};
use super::{StageContext, StageProcessor};
use crate::pipeline::config::{DeskewConfig, DeskewLevel};

/// Deskew stage processor.
#[derive(Debug, Default)]
pub struct DeskewStage;

impl StageProcessor for DeskewStage {
    type Config = DeskewConfig;

    fn name(&self) -> &'static str {
        "deskew"
    }

    fn run(
        &self,
        ctx: &mut StageContext<'_>,
        config: &Self::Config,
    ) -> PipelineResult<StageReport> {
        config.validate()?;
        let start = Instant::now();
        let mut report = StageReport::new(self.name());

        let targets: Vec<NodeId> = match config.operation_level {
            DeskewLevel::Page => ctx.doc.nodes_at_level(Level::Page),
            DeskewLevel::Region => ctx
                .doc
                .nodes_at_level(Level::Region)
                .into_iter()
                .filter(|&id| {
                    matches!(
                        ctx.doc.get(id).map(|n| &n.data),
                        Some(NodeData::Region(attrs))
                            if attrs.kind.is_text() || attrs.kind.is_table()
                    )
                })
                .collect(),
        };
        if targets.is_empty() {
            debug!("deskew: no nodes at {:?} level", config.operation_level);
            return Ok(report.finish(start));
        }

        let mut prepared = Vec::with_capacity(targets.len());
        for id in targets {
            let (_, page_attrs) = owning_page(ctx.doc, id)?;
            let dpi = effective_dpi(config.dpi, &page_attrs);
            if dpi.is_none() && ctx.engine.needs_dpi() {
                warn!("deskew: skipping {}: resolution unknown", id);
                report.record_skip(id, SkipReason::MissingDpi(format!("node {}", id)));
                continue;
            }
            match node_image(ctx.doc, ctx.images, id) {
                Ok(image) => prepared.push((id, (image, dpi))),
                Err(error) => match SkipReason::from_error(&error) {
                    Some(reason) => {
                        warn!("deskew: skipping {}: {}", id, reason);
                        report.record_skip(id, reason);
                    }
                    None => return Err(error),
                },
            }
        }

        let engine = ctx.engine;
        let results = run_detection(ctx.strategy, prepared, |_, (image, dpi)| {
            engine.detect_orientation(image, *dpi)
        });

        for (id, result) in results {
            match result {
                Ok(hypothesis) => {
                    apply_orientation(ctx, id, &hypothesis, config)?;
                    report.record_success();
                }
                Err(error) => match SkipReason::from_error(&error) {
                    Some(reason) => {
                        warn!("deskew: skipping {}: {}", id, reason);
                        report.record_skip(id, reason);
                    }
                    None => return Err(error),
                },
            }
        }

        debug!(
            "deskew: {} nodes annotated, {} skipped",
            report.success_count,
            report.failure_count()
        );
        Ok(report.finish(start))
    }
}

fn apply_orientation(
    ctx: &mut StageContext<'_>,
    id: NodeId,
    hypothesis: &OrientationHypothesis,
    config: &DeskewConfig,
) -> PipelineResult<()> {
    let confident = hypothesis.confidence >= config.min_orientation_confidence;
    if !confident {
        debug!(
            "deskew: ignoring orientation {}° for {} due to low confidence {:.2}",
            hypothesis.orientation_deg, id, hypothesis.confidence
        );
    }

    match ctx.doc.data_mut(id)? {
        NodeData::Page(attrs) => {
            attrs.skew = hypothesis.skew_deg;
            if let Some(script) = &hypothesis.script {
                attrs.script = Some(script.clone());
            }
            if confident && hypothesis.orientation_deg != 0 {
                attrs.orientation = hypothesis.orientation_deg;
                let center = crate::processors::geometry::BoundingBox::new(
                    0.0,
                    0.0,
                    attrs.width as f32,
                    attrs.height as f32,
                )
                .center();
                if let Some(border) = attrs.border {
                    attrs.border = Some(
                        crate::processors::geometry::Geometry::Rect(border)
                            .rotate_about(center, hypothesis.orientation_deg as f32)
                            .bbox(),
                    );
                }
            }
        }
        NodeData::Region(attrs) => {
            attrs.skew = hypothesis.skew_deg;
            if let Some(script) = &hypothesis.script {
                attrs.script = Some(script.clone());
            }
            if confident && hypothesis.orientation_deg != 0 {
                attrs.orientation = hypothesis.orientation_deg;
                let center = attrs.geometry.bbox().center();
                attrs.geometry = attrs
                    .geometry
                    .rotate_about(center, hypothesis.orientation_deg as f32);
            }
        }
        _ => {
            return Err(PipelineError::structural(format!(
                "deskew selected non-page, non-region node {}",
                id
            )));
        }
    }
    Ok(())
}
