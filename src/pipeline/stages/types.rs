//! Shared types for pipeline stage processors.

use std::time::{Duration, Instant};

use crate::core::errors::PipelineError;
use crate::domain::level::Level;
use crate::domain::tree::NodeId;

/// Why a node was skipped instead of processed.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// Degenerate or out-of-bounds geometry.
    Geometry(String),
    /// Resolution required but unavailable.
    MissingDpi(String),
    /// Structure already present at the target level and overwrite was
    /// disabled.
    AlreadySegmented(Level),
    /// The external engine failed or timed out.
    Detection(String),
}

impl SkipReason {
    /// Classifies a node-local error; fatal errors return None and must
    /// propagate.
    pub fn from_error(error: &PipelineError) -> Option<SkipReason> {
        match error {
            PipelineError::Geometry { context } => Some(SkipReason::Geometry(context.clone())),
            PipelineError::MissingDpi { context } => Some(SkipReason::MissingDpi(context.clone())),
            PipelineError::AlreadySegmented { level, .. } => {
                let level = match level.as_str() {
                    "page" => Level::Page,
                    "region" => Level::Region,
                    "line" => Level::Line,
                    "word" => Level::Word,
                    _ => Level::Glyph,
                };
                Some(SkipReason::AlreadySegmented(level))
            }
            PipelineError::Detection { context, .. } => {
                Some(SkipReason::Detection(context.clone()))
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Geometry(context) => write!(f, "geometry: {}", context),
            SkipReason::MissingDpi(context) => write!(f, "missing DPI: {}", context),
            SkipReason::AlreadySegmented(level) => {
                write!(f, "already segmented at {} level", level)
            }
            SkipReason::Detection(context) => write!(f, "detection failed: {}", context),
        }
    }
}

/// One skipped node with its reason, part of the stage report manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSkip {
    pub node: NodeId,
    pub reason: SkipReason,
}

/// Metrics and the skipped-node manifest collected while running a stage.
#[derive(Debug, Clone)]
pub struct StageReport {
    /// Name of the stage that produced this report.
    pub stage: &'static str,
    /// Time taken to process the stage.
    pub processing_time: Option<Duration>,
    /// Number of nodes successfully processed.
    pub success_count: usize,
    /// Nodes skipped with their reasons.
    pub skipped: Vec<NodeSkip>,
}

impl StageReport {
    pub fn new(stage: &'static str) -> Self {
        Self {
            stage,
            processing_time: None,
            success_count: 0,
            skipped: Vec::new(),
        }
    }

    /// Records one successfully processed node.
    pub fn record_success(&mut self) {
        self.success_count += 1;
    }

    /// Records a skipped node.
    pub fn record_skip(&mut self, node: NodeId, reason: SkipReason) {
        self.skipped.push(NodeSkip { node, reason });
    }

    /// Number of skipped nodes.
    pub fn failure_count(&self) -> usize {
        self.skipped.len()
    }

    /// Total nodes visited.
    pub fn total_count(&self) -> usize {
        self.success_count + self.skipped.len()
    }

    /// Stamps the elapsed time since `start`.
    pub fn finish(mut self, start: Instant) -> Self {
        self.processing_time = Some(start.elapsed());
        self
    }
}

/// Strategy for processing the selected nodes of a stage.
#[derive(Debug, Clone, Copy)]
pub enum ProcessingStrategy {
    /// Always process sequentially.
    Sequential,
    /// Always process in parallel.
    Parallel,
    /// Parallel when the node count exceeds the threshold.
    Auto(usize),
}

impl Default for ProcessingStrategy {
    fn default() -> Self {
        ProcessingStrategy::Auto(4)
    }
}

impl ProcessingStrategy {
    /// Determine if parallel processing should be used for the given node
    /// count.
    pub fn should_use_parallel(&self, item_count: usize) -> bool {
        match self {
            ProcessingStrategy::Sequential => false,
            ProcessingStrategy::Parallel => true,
            ProcessingStrategy::Auto(threshold) => item_count > *threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_thresholds() {
        assert!(!ProcessingStrategy::Sequential.should_use_parallel(100));
        assert!(ProcessingStrategy::Parallel.should_use_parallel(1));
        assert!(!ProcessingStrategy::Auto(4).should_use_parallel(4));
        assert!(ProcessingStrategy::Auto(4).should_use_parallel(5));
    }

    #[test]
    fn test_skip_reason_classification() {
        assert!(SkipReason::from_error(&PipelineError::geometry("zero area")).is_some());
        assert!(SkipReason::from_error(&PipelineError::parameter("bad")).is_none());
        assert!(SkipReason::from_error(&PipelineError::structural("orphan")).is_none());
    }

    #[test]
    fn test_report_counts() {
        let mut report = StageReport::new("segment-line");
        report.record_success();
        report.record_success();
        report.record_skip(NodeId(7), SkipReason::MissingDpi("page n0".into()));
        assert_eq!(report.success_count, 2);
        assert_eq!(report.failure_count(), 1);
        assert_eq!(report.total_count(), 3);
    }
}
