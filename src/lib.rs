//! # pageflow
//!
//! A document-layout processing pipeline for page images: a sequence of
//! stages that progressively derive a hierarchical structural and
//! textual annotation (page → region → line → word → glyph) from raster
//! scans, each stage reading an existing annotation layer and refining
//! it.
//!
//! ## Components
//!
//! - **Document tree**: an arena-backed page/region/line/word/glyph
//!   hierarchy with strict structural invariants and level-scoped
//!   overwrite semantics
//! - **Geometry core**: bounding boxes and polygons with padding,
//!   clipping, masking and coordinate normalization
//! - **Stage contracts**: deskew, crop, binarize, segment-region,
//!   segment-table, segment-line, segment-word and recognize
//! - **Pipeline driver**: runs workflow-defined stage orders against a
//!   storage collaborator
//!
//! The detection/recognition engine itself is an injected capability
//! ([`core::traits::LayoutEngine`]); the crate ships no OCR backend and
//! is fully testable with a deterministic scripted engine.
//!
//! ## Modules
//!
//! * [`core`] - Error handling, configuration validation, engine traits
//! * [`domain`] - The document tree, levels, overwrite policy, hypotheses
//! * [`pipeline`] - Stage processors, stage configuration, the driver
//! * [`processors`] - Geometry primitives and raster operators
//! * [`storage`] - The file-group storage boundary
//! * [`utils`] - Image loading helpers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pageflow::prelude::*;
//! use pageflow::pipeline::{SegmentLineConfig, SegmentWordConfig, StageSpec, WorkflowStep};
//!
//! # fn run(engine: &dyn LayoutEngine) -> PipelineResult<()> {
//! let storage = DirectoryStorage::new("workspace/annotations");
//! let workflow = Workflow::new(vec![
//!     WorkflowStep {
//!         input: "OCR-D-SEG-REGION".into(),
//!         output: "OCR-D-SEG-LINE".into(),
//!         stage: StageSpec::SegmentLine(SegmentLineConfig::default()),
//!     },
//!     WorkflowStep {
//!         input: "OCR-D-SEG-LINE".into(),
//!         output: "OCR-D-SEG-WORD".into(),
//!         stage: StageSpec::SegmentWord(SegmentWordConfig::default()),
//!     },
//! ]);
//!
//! let driver = PipelineDriver::new(&storage, engine)
//!     .with_image_root("workspace/images");
//! let report = driver.run(&workflow)?;
//! println!("{} nodes skipped", report.skipped_count());
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod domain;
pub mod pipeline;
pub mod processors;
pub mod storage;
pub mod utils;

/// Prelude module for convenient imports.
///
/// Bring the essentials into scope with a single use statement:
///
/// ```rust
/// use pageflow::prelude::*;
/// ```
pub mod prelude {
    pub use crate::core::{LayoutEngine, PipelineError, PipelineResult};
    pub use crate::domain::{Document, Level, NodeData, NodeId, PageAttrs, RegionKind, TextEquiv};
    pub use crate::pipeline::{
        PipelineDriver, ProcessingStrategy, RunReport, StageContext, StageReport, Workflow,
    };
    pub use crate::processors::{BoundingBox, Geometry, Point, Polygon};
    pub use crate::storage::{DirectoryStorage, Storage};
    pub use crate::utils::load_image;
}
