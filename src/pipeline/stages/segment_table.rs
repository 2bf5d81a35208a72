//! Segment-table stage: cell detection inside table regions.
//!
//! Restricted to table-typed regions; detected cells become child
//! regions of the table per the overwrite policy at the region level,
//! scoped to the table's subtree only.

use std::time::Instant;

use tracing::{debug, warn};

use crate::core::config::ConfigValidator;
use crate::core::errors::PipelineResult;
use crate::domain::level::Level;
use crate::domain::overwrite::prepare_children;
use crate::domain::tree::{NodeData, RegionAttrs, RegionKind};

use super::support::{node_image, run_detection};
use super::types::{SkipReason, StageReport};
use super::{StageContext, StageProcessor};
use crate::pipeline::config::SegmentTableConfig;

/// Segment-table stage processor.
#[derive(Debug, Default)]
pub struct SegmentTableStage;

impl StageProcessor for SegmentTableStage {
    type Config = SegmentTableConfig;

    fn name(&self) -> &'static str {
        "segment-table"
    }

    fn run(
        &self,
        ctx: &mut StageContext<'_>,
        config: &Self::Config,
    ) -> PipelineResult<StageReport> {
        config.validate()?;
        let start = Instant::now();
        let mut report = StageReport::new(self.name());

        let tables: Vec<_> = ctx
            .doc
            .nodes_at_level(Level::Region)
            .into_iter()
            .filter(|&id| {
                matches!(
                    ctx.doc.get(id).map(|n| &n.data),
                    Some(NodeData::Region(attrs)) if attrs.kind.is_table()
                )
            })
            .collect();
        if tables.is_empty() {
            debug!("segment-table: document has no table regions");
            return Ok(report.finish(start));
        }

        let mut prepared = Vec::with_capacity(tables.len());
        for table in tables {
            if !config.overwrite_cells && ctx.doc.has_children(table) {
                debug!("segment-table: keeping existing cells of table {}", table);
                report.record_skip(table, SkipReason::AlreadySegmented(Level::Region));
                continue;
            }
            match node_image(ctx.doc, ctx.images, table) {
                Ok(image) => prepared.push((table, image)),
                Err(error) => match SkipReason::from_error(&error) {
                    Some(reason) => {
                        warn!("segment-table: skipping table {}: {}", table, reason);
                        report.record_skip(table, reason);
                    }
                    None => return Err(error),
                },
            }
        }

        let engine = ctx.engine;
        let results = run_detection(ctx.strategy, prepared, |_, image| {
            engine.detect_table_cells(image)
        });

        for (table, result) in results {
            let cells = match result {
                Ok(cells) => cells,
                Err(error) => match SkipReason::from_error(&error) {
                    Some(reason) => {
                        warn!("segment-table: skipping table {}: {}", table, reason);
                        report.record_skip(table, reason);
                        continue;
                    }
                    None => return Err(error),
                },
            };

            match prepare_children(ctx.doc, table, Level::Region, config.overwrite_cells) {
                Ok(_) => {}
                Err(error) => match SkipReason::from_error(&error) {
                    Some(reason) => {
                        report.record_skip(table, reason);
                        continue;
                    }
                    None => return Err(error),
                },
            }

            let bounds = ctx.doc.node_bounds(table)?;
            let offset = (bounds.x0.floor().max(0.0), bounds.y0.floor().max(0.0));
            let children: Vec<NodeData> = cells
                .into_iter()
                .map(|geometry| geometry.translate(offset.0, offset.1))
                .filter(|geometry| !geometry.is_degenerate())
                .map(|geometry| {
                    NodeData::Region(RegionAttrs::new(geometry, RegionKind::Text))
                })
                .collect();

            let count = children.len();
            ctx.doc.attach_children(table, children)?;
            debug!("segment-table: table {} has {} cells", table, count);
            report.record_success();
        }

        Ok(report.finish(start))
    }
}
