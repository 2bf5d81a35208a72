//! Pipeline stage processors.
//!
//! Each stage is a pure function over the document tree, the per-run
//! image store, its parameter struct and the injected detection engine:
//! it selects the nodes at its operation level in document order, runs
//! detection per node (in parallel when worthwhile) and applies tree
//! mutations serially afterwards, so reading-order invariants hold
//! without locking. Node-local failures are recorded in the stage report
//! instead of aborting the run.

pub mod binarize;
pub mod crop;
pub mod deskew;
pub mod recognize;
pub mod segment_line;
pub mod segment_region;
pub mod segment_table;
pub mod segment_word;
pub mod support;
pub mod types;

pub use binarize::BinarizeStage;
pub use crop::CropStage;
pub use deskew::DeskewStage;
pub use recognize::RecognizeStage;
pub use segment_line::SegmentLineStage;
pub use segment_region::SegmentRegionStage;
pub use segment_table::SegmentTableStage;
pub use segment_word::SegmentWordStage;
pub use types::{NodeSkip, ProcessingStrategy, SkipReason, StageReport};

use crate::core::config::ConfigValidator;
use crate::core::errors::PipelineResult;
use crate::core::traits::LayoutEngine;
use crate::domain::tree::Document;
use crate::pipeline::images::ImageStore;

/// Mutable state a stage operates on during one pipeline run.
pub struct StageContext<'a> {
    /// The document tree being annotated.
    pub doc: &'a mut Document,
    /// Image buffers for this run.
    pub images: &'a mut ImageStore,
    /// The injected detection/recognition engine.
    pub engine: &'a dyn LayoutEngine,
    /// Parallel/sequential processing decision.
    pub strategy: ProcessingStrategy,
}

impl<'a> StageContext<'a> {
    pub fn new(
        doc: &'a mut Document,
        images: &'a mut ImageStore,
        engine: &'a dyn LayoutEngine,
    ) -> Self {
        Self {
            doc,
            images,
            engine,
            strategy: ProcessingStrategy::default(),
        }
    }

    /// Overrides the processing strategy.
    pub fn with_strategy(mut self, strategy: ProcessingStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

/// The contract every pipeline stage implements.
pub trait StageProcessor {
    /// The stage's parameter struct.
    type Config: ConfigValidator;

    /// Stage name used in reports and logs.
    fn name(&self) -> &'static str;

    /// Runs the stage over the selected nodes, mutating the tree.
    ///
    /// Parameter validation happens first; an invalid configuration
    /// aborts before any node is touched. An empty selection is a no-op,
    /// not an error.
    fn run(&self, ctx: &mut StageContext<'_>, config: &Self::Config)
    -> PipelineResult<StageReport>;
}
