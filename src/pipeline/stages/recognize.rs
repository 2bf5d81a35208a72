//! Recognize stage: text recognition down to a configurable level.
//!
//! Recognition walks the text regions in document order and annotates
//! every node from the deepest recognized level upward: words are joined
//! into line text and lines into region text with single-space
//! separators. Structure missing below the target level is segmented
//! implicitly through the engine's line/word detectors, unless
//! `raw_lines` forbids additional segmentation, in which case every line
//! image is recognized as a single unit.

use std::time::Instant;

use tracing::{debug, warn};

use crate::core::config::ConfigValidator;
use crate::core::errors::{PipelineError, PipelineResult};
use crate::domain::hypotheses::CharFilter;
use crate::domain::level::Level;
use crate::domain::tree::{GlyphAttrs, NodeData, NodeId, TextEquiv, WordAttrs};

use super::support::{effective_dpi, node_image, owning_page, run_detection};
use super::types::{SkipReason, StageReport};
use super::{StageContext, StageProcessor};
use crate::pipeline::config::{RecognizeConfig, TextEquivLevel};

/// Recognize stage processor.
#[derive(Debug, Default)]
pub struct RecognizeStage;

impl StageProcessor for RecognizeStage {
    type Config = RecognizeConfig;

    fn name(&self) -> &'static str {
        "recognize"
    }

    fn run(
        &self,
        ctx: &mut StageContext<'_>,
        config: &Self::Config,
    ) -> PipelineResult<StageReport> {
        config.validate()?;
        let start = Instant::now();
        let mut report = StageReport::new(self.name());

        let filter = CharFilter::new(
            config.char_whitelist.as_deref(),
            config.char_blacklist.as_deref(),
            config.char_unblacklist.as_deref(),
        );

        // Independent of the target level: drop stale word/glyph
        // structure up front when requested.
        if config.overwrite_words {
            for line in ctx.doc.nodes_at_level(Level::Line) {
                let removed = ctx.doc.detach_children(line)?;
                if !removed.is_empty() {
                    debug!(
                        "recognize: cleared {} stale word nodes under line {}",
                        removed.len(),
                        line
                    );
                }
            }
        }

        let regions = text_regions(ctx);
        if regions.is_empty() {
            debug!("recognize: document has no text regions");
            return Ok(report.finish(start));
        }

        match config.textequiv_level {
            TextEquivLevel::Region => {
                self.recognize_region_level(ctx, config, &filter, regions, &mut report)?
            }
            TextEquivLevel::Line => {
                self.recognize_line_level(ctx, config, &filter, regions, &mut report)?
            }
            TextEquivLevel::Word | TextEquivLevel::Glyph => {
                self.recognize_word_level(ctx, config, &filter, regions, &mut report)?
            }
        }

        debug!(
            "recognize: {} nodes annotated, {} skipped",
            report.success_count,
            report.failure_count()
        );
        Ok(report.finish(start))
    }
}

impl RecognizeStage {
    /// Recognizes whole region images, one call per region.
    fn recognize_region_level(
        &self,
        ctx: &mut StageContext<'_>,
        config: &RecognizeConfig,
        filter: &CharFilter,
        regions: Vec<NodeId>,
        report: &mut StageReport,
    ) -> PipelineResult<()> {
        let prepared = self.prepare_unrecognized(ctx, config, regions, report)?;

        let engine = ctx.engine;
        let model = config.model.as_deref();
        let results = run_detection(ctx.strategy, prepared, |_, image| {
            engine.recognize(image, model, filter)
        });

        for (region, result) in results {
            match result {
                Ok(spans) => {
                    let joined = join_spans(spans.iter().map(|s| (s.text.as_str(), s.confidence)));
                    ctx.doc.set_primary_text(region, joined)?;
                    report.record_success();
                }
                Err(error) => self.skip_or_fail(report, region, error)?,
            }
        }
        Ok(())
    }

    /// Recognizes line images as single units, one call per line.
    fn recognize_line_level(
        &self,
        ctx: &mut StageContext<'_>,
        config: &RecognizeConfig,
        filter: &CharFilter,
        regions: Vec<NodeId>,
        report: &mut StageReport,
    ) -> PipelineResult<()> {
        let mut lines = Vec::new();
        for region in regions {
            if self.ensure_lines(ctx, config, region, report)? {
                lines.extend(ctx.doc.node(region)?.children.clone());
            }
        }

        let prepared = self.prepare_unrecognized(ctx, config, lines, report)?;

        let engine = ctx.engine;
        let model = config.model.as_deref();
        let results = run_detection(ctx.strategy, prepared, |_, image| {
            engine.recognize(image, model, filter)
        });

        for (line, result) in results {
            match result {
                Ok(spans) => {
                    let joined = join_spans(spans.iter().map(|s| (s.text.as_str(), s.confidence)));
                    ctx.doc.set_primary_text(line, joined)?;
                    report.record_success();
                }
                Err(error) => self.skip_or_fail(report, line, error)?,
            }
        }

        self.update_parents(ctx)?;
        Ok(())
    }

    /// Recognizes word images, one call per word, optionally deriving
    /// glyph nodes from the recognized spans.
    fn recognize_word_level(
        &self,
        ctx: &mut StageContext<'_>,
        config: &RecognizeConfig,
        filter: &CharFilter,
        regions: Vec<NodeId>,
        report: &mut StageReport,
    ) -> PipelineResult<()> {
        let mut words = Vec::new();
        for region in regions {
            if !self.ensure_lines(ctx, config, region, report)? {
                continue;
            }
            for line in ctx.doc.node(region)?.children.clone() {
                if self.ensure_words(ctx, line, report)? {
                    words.extend(ctx.doc.node(line)?.children.clone());
                }
            }
        }

        let prepared = self.prepare_unrecognized(ctx, config, words, report)?;

        let engine = ctx.engine;
        let model = config.model.as_deref();
        let results = run_detection(ctx.strategy, prepared, |_, image| {
            engine.recognize(image, model, filter)
        });

        let want_glyphs = config.textequiv_level == TextEquivLevel::Glyph;
        for (word, result) in results {
            match result {
                Ok(spans) => {
                    if want_glyphs {
                        self.write_glyphs(ctx, word, &spans)?;
                    }
                    let joined = join_spans(spans.iter().map(|s| (s.text.as_str(), s.confidence)));
                    ctx.doc.set_primary_text(word, joined)?;
                    report.record_success();
                }
                Err(error) => self.skip_or_fail(report, word, error)?,
            }
        }

        self.update_parents(ctx)?;
        Ok(())
    }

    /// Filters `nodes` down to the ones still lacking recognition and
    /// pairs them with their subimages, recording skips along the way.
    fn prepare_unrecognized(
        &self,
        ctx: &mut StageContext<'_>,
        config: &RecognizeConfig,
        nodes: Vec<NodeId>,
        report: &mut StageReport,
    ) -> PipelineResult<Vec<(NodeId, image::RgbImage)>> {
        let mut prepared = Vec::with_capacity(nodes.len());
        for id in nodes {
            if ctx.doc.primary_text(id).is_some() {
                debug!("recognize: {} already recognized", id);
                continue;
            }
            let (_, page_attrs) = owning_page(ctx.doc, id)?;
            if effective_dpi(config.dpi, &page_attrs).is_none() && ctx.engine.needs_dpi() {
                warn!("recognize: skipping {}: resolution unknown", id);
                report.record_skip(id, SkipReason::MissingDpi(format!("node {}", id)));
                continue;
            }
            match node_image(ctx.doc, ctx.images, id) {
                Ok(image) => prepared.push((id, image)),
                Err(error) => match SkipReason::from_error(&error) {
                    Some(reason) => {
                        warn!("recognize: skipping {}: {}", id, reason);
                        report.record_skip(id, reason);
                    }
                    None => return Err(error),
                },
            }
        }
        Ok(prepared)
    }

    /// Makes sure `region` has line structure, invoking the engine's line
    /// detector when permitted. Returns false when the region must be
    /// skipped.
    fn ensure_lines(
        &self,
        ctx: &mut StageContext<'_>,
        config: &RecognizeConfig,
        region: NodeId,
        report: &mut StageReport,
    ) -> PipelineResult<bool> {
        if ctx.doc.has_children(region) {
            return Ok(true);
        }
        if config.raw_lines {
            // Fresh structure is required but segmentation is forbidden.
            warn!(
                "recognize: region {} has no lines and raw_lines forbids segmentation",
                region
            );
            report.record_skip(region, SkipReason::AlreadySegmented(Level::Line));
            return Ok(false);
        }

        let image = match node_image(ctx.doc, ctx.images, region) {
            Ok(image) => image,
            Err(error) => return self.skip_or_fail(report, region, error).map(|_| false),
        };
        let lines = match ctx.engine.detect_lines(&image) {
            Ok(lines) => lines,
            Err(error) => return self.skip_or_fail(report, region, error).map(|_| false),
        };

        let bounds = ctx.doc.node_bounds(region)?;
        let offset = (bounds.x0.floor().max(0.0), bounds.y0.floor().max(0.0));
        let children: Vec<NodeData> = lines
            .into_iter()
            .map(|geometry| geometry.translate(offset.0, offset.1))
            .filter(|geometry| !geometry.is_degenerate())
            .map(|geometry| NodeData::Line(crate::domain::tree::LineAttrs::new(geometry)))
            .collect();
        debug!(
            "recognize: implicitly segmented region {} into {} lines",
            region,
            children.len()
        );
        ctx.doc.attach_children(region, children)?;
        Ok(true)
    }

    /// Makes sure `line` has word structure, invoking the engine's word
    /// detector when needed. Returns false when the line must be skipped.
    fn ensure_words(
        &self,
        ctx: &mut StageContext<'_>,
        line: NodeId,
        report: &mut StageReport,
    ) -> PipelineResult<bool> {
        if ctx.doc.has_children(line) {
            return Ok(true);
        }

        let image = match node_image(ctx.doc, ctx.images, line) {
            Ok(image) => image,
            Err(error) => return self.skip_or_fail(report, line, error).map(|_| false),
        };
        let words = match ctx.engine.detect_words(&image) {
            Ok(words) => words,
            Err(error) => return self.skip_or_fail(report, line, error).map(|_| false),
        };

        let bounds = ctx.doc.node_bounds(line)?;
        let offset = (bounds.x0.floor().max(0.0), bounds.y0.floor().max(0.0));
        let children: Vec<NodeData> = words
            .into_iter()
            .map(|geometry| geometry.translate(offset.0, offset.1))
            .filter(|geometry| !geometry.is_degenerate())
            .map(|geometry| NodeData::Word(WordAttrs::new(geometry)))
            .collect();
        debug!(
            "recognize: implicitly segmented line {} into {} words",
            line,
            children.len()
        );
        ctx.doc.attach_children(line, children)?;
        Ok(true)
    }

    /// Replaces the glyphs of `word` with one glyph per recognized span.
    fn write_glyphs(
        &self,
        ctx: &mut StageContext<'_>,
        word: NodeId,
        spans: &[crate::domain::hypotheses::RecognizedSpan],
    ) -> PipelineResult<()> {
        ctx.doc.detach_children(word)?;

        let word_geometry = ctx
            .doc
            .node(word)?
            .data
            .geometry()
            .expect("words carry geometry")
            .clone();
        let bounds = word_geometry.bbox();
        let offset = (bounds.x0.floor().max(0.0), bounds.y0.floor().max(0.0));

        let mut glyphs = Vec::with_capacity(spans.len());
        let mut texts = Vec::with_capacity(spans.len());
        for span in spans {
            let geometry = match &span.geometry {
                Some(geometry) => geometry.translate(offset.0, offset.1),
                None => word_geometry.clone(),
            };
            glyphs.push(NodeData::Glyph(GlyphAttrs::new(geometry)));
            texts.push((span.text.clone(), span.confidence));
        }

        let ids = ctx.doc.attach_children(word, glyphs)?;
        for (id, (text, confidence)) in ids.into_iter().zip(texts) {
            ctx.doc
                .set_primary_text(id, TextEquiv::new(text, Some(confidence)))?;
        }
        Ok(())
    }

    /// Propagates recognized text upward: line text from word texts,
    /// region text from line texts, joined with single spaces.
    fn update_parents(&self, ctx: &mut StageContext<'_>) -> PipelineResult<()> {
        for line in ctx.doc.nodes_at_level(Level::Line) {
            if let Some(joined) = self.join_children_text(ctx, line)? {
                ctx.doc.set_primary_text(line, joined)?;
            }
        }
        for region in ctx.doc.nodes_at_level(Level::Region) {
            if let Some(joined) = self.join_children_text(ctx, region)? {
                ctx.doc.set_primary_text(region, joined)?;
            }
        }
        Ok(())
    }

    /// Joins the primary texts of a node's children, or None when no
    /// child carries text yet.
    fn join_children_text(
        &self,
        ctx: &StageContext<'_>,
        parent: NodeId,
    ) -> PipelineResult<Option<TextEquiv>> {
        let children = &ctx.doc.node(parent)?.children;
        let mut parts = Vec::with_capacity(children.len());
        for &child in children {
            let data = &ctx.doc.node(child)?.data;
            let Some(equiv) = data.text_equivs().iter().find(|t| t.index == 0) else {
                continue;
            };
            parts.push((equiv.text.as_str(), equiv.confidence.unwrap_or(0.0)));
        }
        if parts.is_empty() {
            return Ok(None);
        }
        Ok(Some(join_spans(parts.into_iter())))
    }

    fn skip_or_fail(
        &self,
        report: &mut StageReport,
        node: NodeId,
        error: PipelineError,
    ) -> PipelineResult<()> {
        match SkipReason::from_error(&error) {
            Some(reason) => {
                warn!("recognize: skipping {}: {}", node, reason);
                report.record_skip(node, reason);
                Ok(())
            }
            None => Err(error),
        }
    }
}

/// The text regions of the document, including table cells, in document
/// order.
fn text_regions(ctx: &StageContext<'_>) -> Vec<NodeId> {
    ctx.doc
        .nodes_at_level(Level::Region)
        .into_iter()
        .filter(|&id| {
            matches!(
                ctx.doc.get(id).map(|n| &n.data),
                Some(NodeData::Region(attrs)) if attrs.kind.is_text()
            )
        })
        .collect()
}

/// Joins recognized parts with single-space separators, averaging the
/// confidences of the joined parts.
fn join_spans<'a>(parts: impl Iterator<Item = (&'a str, f32)>) -> TextEquiv {
    let mut texts = Vec::new();
    let mut confidence_sum = 0.0;
    for (text, confidence) in parts {
        texts.push(text.to_string());
        confidence_sum += confidence;
    }
    let confidence = if texts.is_empty() {
        None
    } else {
        Some(confidence_sum / texts.len() as f32)
    };
    TextEquiv::new(texts.join(" "), confidence)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_spans_single_space() {
        let joined = join_spans(vec![("alpha", 0.9), ("beta", 0.7)].into_iter());
        assert_eq!(joined.text, "alpha beta");
        assert!((joined.confidence.unwrap() - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_join_spans_empty() {
        let joined = join_spans(std::iter::empty());
        assert_eq!(joined.text, "");
        assert!(joined.confidence.is_none());
    }
}
