//! Pipeline driver: runs a workflow of stages over stored documents.
//!
//! A workflow is an ordered list of steps, each naming the annotation
//! file group it reads, the group it writes and the stage with its
//! parameters. The driver validates every stage configuration before any
//! processing starts, reuses the in-memory tree when a step consumes the
//! previous step's output, and stores each step's result only after the
//! stage completed without a fatal error, so a failed run leaves the
//! previously stored state untouched.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::config::{ConfigError, ConfigValidator};
use crate::core::errors::PipelineResult;
use crate::core::traits::LayoutEngine;
use crate::domain::tree::Document;
use crate::pipeline::config::{
    BinarizeConfig, CropConfig, DeskewConfig, RecognizeConfig, SegmentLineConfig,
    SegmentRegionConfig, SegmentTableConfig, SegmentWordConfig,
};
use crate::pipeline::images::ImageStore;
use crate::pipeline::stages::{
    BinarizeStage, CropStage, DeskewStage, ProcessingStrategy, RecognizeStage, SegmentLineStage,
    SegmentRegionStage, SegmentTableStage, SegmentWordStage, StageContext, StageProcessor,
    StageReport,
};
use crate::storage::Storage;

/// A stage selector with its parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "kebab-case")]
pub enum StageSpec {
    Deskew(DeskewConfig),
    Crop(CropConfig),
    Binarize(BinarizeConfig),
    SegmentRegion(SegmentRegionConfig),
    SegmentTable(SegmentTableConfig),
    SegmentLine(SegmentLineConfig),
    SegmentWord(SegmentWordConfig),
    Recognize(RecognizeConfig),
}

impl StageSpec {
    /// The stage name as used in workflow definitions.
    pub fn name(&self) -> &'static str {
        match self {
            StageSpec::Deskew(_) => "deskew",
            StageSpec::Crop(_) => "crop",
            StageSpec::Binarize(_) => "binarize",
            StageSpec::SegmentRegion(_) => "segment-region",
            StageSpec::SegmentTable(_) => "segment-table",
            StageSpec::SegmentLine(_) => "segment-line",
            StageSpec::SegmentWord(_) => "segment-word",
            StageSpec::Recognize(_) => "recognize",
        }
    }

    /// Validates the embedded stage parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            StageSpec::Deskew(config) => config.validate(),
            StageSpec::Crop(config) => config.validate(),
            StageSpec::Binarize(config) => config.validate(),
            StageSpec::SegmentRegion(config) => config.validate(),
            StageSpec::SegmentTable(config) => config.validate(),
            StageSpec::SegmentLine(config) => config.validate(),
            StageSpec::SegmentWord(config) => config.validate(),
            StageSpec::Recognize(config) => config.validate(),
        }
    }

    /// Runs the stage against the given context.
    pub fn execute(&self, ctx: &mut StageContext<'_>) -> PipelineResult<StageReport> {
        match self {
            StageSpec::Deskew(config) => DeskewStage.run(ctx, config),
            StageSpec::Crop(config) => CropStage.run(ctx, config),
            StageSpec::Binarize(config) => BinarizeStage.run(ctx, config),
            StageSpec::SegmentRegion(config) => SegmentRegionStage.run(ctx, config),
            StageSpec::SegmentTable(config) => SegmentTableStage.run(ctx, config),
            StageSpec::SegmentLine(config) => SegmentLineStage.run(ctx, config),
            StageSpec::SegmentWord(config) => SegmentWordStage.run(ctx, config),
            StageSpec::Recognize(config) => RecognizeStage.run(ctx, config),
        }
    }
}

/// One workflow step: input file group, output file group and the stage
/// to run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// File group the step reads.
    pub input: String,
    /// File group the step writes.
    pub output: String,
    /// The stage and its parameters.
    #[serde(flatten)]
    pub stage: StageSpec,
}

/// An ordered list of workflow steps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Workflow {
    pub steps: Vec<WorkflowStep>,
}

impl Workflow {
    pub fn new(steps: Vec<WorkflowStep>) -> Self {
        Self { steps }
    }
}

/// Aggregated reports of a completed pipeline run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub steps: Vec<StageReport>,
}

impl RunReport {
    /// Total number of node skips across all steps.
    pub fn skipped_count(&self) -> usize {
        self.steps.iter().map(|s| s.skipped.len()).sum()
    }
}

/// Runs workflows against a storage collaborator and a detection engine.
pub struct PipelineDriver<'a> {
    storage: &'a dyn Storage,
    engine: &'a dyn LayoutEngine,
    strategy: ProcessingStrategy,
    image_root: Option<PathBuf>,
}

impl<'a> PipelineDriver<'a> {
    pub fn new(storage: &'a dyn Storage, engine: &'a dyn LayoutEngine) -> Self {
        Self {
            storage,
            engine,
            strategy: ProcessingStrategy::default(),
            image_root: None,
        }
    }

    /// Overrides the parallel/sequential processing strategy.
    pub fn with_strategy(mut self, strategy: ProcessingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Resolves page image references relative to `root`.
    pub fn with_image_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.image_root = Some(root.into());
        self
    }

    /// Runs all workflow steps in order.
    ///
    /// Every stage configuration is validated up front; a fatal error in
    /// any step aborts the run before that step's output is stored.
    pub fn run(&self, workflow: &Workflow) -> PipelineResult<RunReport> {
        for step in &workflow.steps {
            step.stage.validate()?;
        }

        let mut images = match &self.image_root {
            Some(root) => ImageStore::with_root(root),
            None => ImageStore::new(),
        };
        let mut current: Option<(String, Document)> = None;
        let mut reports = Vec::with_capacity(workflow.steps.len());

        for step in &workflow.steps {
            let mut doc = match current.take() {
                Some((group, doc)) if group == step.input => doc,
                _ => self.storage.load(&step.input)?,
            };

            info!(
                "running {} on file group {} into {}",
                step.stage.name(),
                step.input,
                step.output
            );
            let mut ctx =
                StageContext::new(&mut doc, &mut images, self.engine).with_strategy(self.strategy);
            let report = step.stage.execute(&mut ctx)?;

            self.storage.store(&step.output, &doc)?;
            reports.push(report);
            current = Some((step.output.clone(), doc));
        }

        Ok(RunReport { steps: reports })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_step_deserialization() {
        let step: WorkflowStep = serde_json::from_str(
            r#"{
                "input": "OCR-D-IMG",
                "output": "OCR-D-SEG",
                "stage": "segment-region",
                "overwrite_regions": false,
                "padding": 8
            }"#,
        )
        .unwrap();
        assert_eq!(step.stage.name(), "segment-region");
        match &step.stage {
            StageSpec::SegmentRegion(config) => {
                assert!(!config.overwrite_regions);
                assert_eq!(config.padding, 8);
                assert!(config.find_tables);
            }
            _ => panic!("wrong stage variant"),
        }
    }

    #[test]
    fn test_unknown_stage_fails() {
        let result = serde_json::from_str::<WorkflowStep>(
            r#"{"input": "A", "output": "B", "stage": "segment-paragraph"}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_stage_spec_validation() {
        let spec = StageSpec::Deskew(DeskewConfig {
            min_orientation_confidence: -1.0,
            ..Default::default()
        });
        assert!(spec.validate().is_err());
    }
}
