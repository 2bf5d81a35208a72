//! Segment-word stage: word detection inside text lines.

use std::time::Instant;

use tracing::{debug, warn};

use crate::core::config::ConfigValidator;
use crate::core::errors::PipelineResult;
use crate::domain::level::Level;
use crate::domain::overwrite::prepare_children;
use crate::domain::tree::{NodeData, WordAttrs};

use super::support::{node_image, run_detection};
use super::types::{SkipReason, StageReport};
use super::{StageContext, StageProcessor};
use crate::pipeline::config::SegmentWordConfig;

/// Segment-word stage processor.
#[derive(Debug, Default)]
pub struct SegmentWordStage;

impl StageProcessor for SegmentWordStage {
    type Config = SegmentWordConfig;

    fn name(&self) -> &'static str {
        "segment-word"
    }

    fn run(
        &self,
        ctx: &mut StageContext<'_>,
        config: &Self::Config,
    ) -> PipelineResult<StageReport> {
        config.validate()?;
        let start = Instant::now();
        let mut report = StageReport::new(self.name());

        let lines = ctx.doc.nodes_at_level(Level::Line);
        if lines.is_empty() {
            debug!("segment-word: document has no lines");
            return Ok(report.finish(start));
        }

        let mut prepared = Vec::with_capacity(lines.len());
        for line in lines {
            if !config.overwrite_words && ctx.doc.has_children(line) {
                debug!("segment-word: keeping existing words in line {}", line);
                report.record_skip(line, SkipReason::AlreadySegmented(Level::Word));
                continue;
            }
            match node_image(ctx.doc, ctx.images, line) {
                Ok(image) => prepared.push((line, image)),
                Err(error) => match SkipReason::from_error(&error) {
                    Some(reason) => {
                        warn!("segment-word: skipping line {}: {}", line, reason);
                        report.record_skip(line, reason);
                    }
                    None => return Err(error),
                },
            }
        }

        let engine = ctx.engine;
        let results = run_detection(ctx.strategy, prepared, |_, image| {
            engine.detect_words(image)
        });

        for (line, result) in results {
            let words = match result {
                Ok(words) => words,
                Err(error) => match SkipReason::from_error(&error) {
                    Some(reason) => {
                        warn!("segment-word: skipping line {}: {}", line, reason);
                        report.record_skip(line, reason);
                        continue;
                    }
                    None => return Err(error),
                },
            };

            match prepare_children(ctx.doc, line, Level::Word, config.overwrite_words) {
                Ok(_) => {}
                Err(error) => match SkipReason::from_error(&error) {
                    Some(reason) => {
                        report.record_skip(line, reason);
                        continue;
                    }
                    None => return Err(error),
                },
            }

            let bounds = ctx.doc.node_bounds(line)?;
            let offset = (bounds.x0.floor().max(0.0), bounds.y0.floor().max(0.0));
            let children: Vec<NodeData> = words
                .into_iter()
                .map(|geometry| geometry.translate(offset.0, offset.1))
                .filter(|geometry| !geometry.is_degenerate())
                .map(|geometry| NodeData::Word(WordAttrs::new(geometry)))
                .collect();

            let count = children.len();
            ctx.doc.attach_children(line, children)?;
            debug!("segment-word: line {} has {} words", line, count);
            report.record_success();
        }

        Ok(report.finish(start))
    }
}
