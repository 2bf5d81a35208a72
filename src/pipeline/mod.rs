//! The stage-contract pipeline: per-stage configuration, the image
//! store, the stage processors and the workflow driver.

pub mod config;
pub mod driver;
pub mod images;
pub mod stages;

pub use config::{
    BinarizeConfig, BinarizeLevel, CropConfig, DeskewConfig, DeskewLevel, RecognizeConfig,
    SegmentLineConfig, SegmentRegionConfig, SegmentTableConfig, SegmentWordConfig, TextEquivLevel,
};
pub use driver::{PipelineDriver, RunReport, StageSpec, Workflow, WorkflowStep};
pub use images::ImageStore;
pub use stages::{
    BinarizeStage, CropStage, DeskewStage, NodeSkip, ProcessingStrategy, RecognizeStage,
    SegmentLineStage, SegmentRegionStage, SegmentTableStage, SegmentWordStage, SkipReason,
    StageContext, StageProcessor, StageReport,
};
