//! Core trait for the injected detection/recognition engine.
//!
//! The pipeline never talks to a concrete OCR backend directly. Stages
//! receive a [`LayoutEngine`] implementation and treat every call as a
//! possibly-blocking, possibly-expensive operation; it is the only
//! suspension point inside a stage. This keeps the document model and the
//! stage contracts testable with a deterministic scripted engine.

use image::RgbImage;

use crate::core::errors::PipelineResult;
use crate::domain::hypotheses::{
    CharFilter, OrientationHypothesis, RecognizedSpan, RegionDetectionOptions, RegionHypothesis,
};
use crate::processors::geometry::{BoundingBox, Geometry};

/// External detection and recognition capability.
///
/// All geometries returned by an engine are relative to the image it was
/// handed; stages translate them back into page coordinates. Errors from
/// engine calls are node-local: the pipeline skips the affected node and
/// records the failure.
pub trait LayoutEngine: Send + Sync {
    /// Detects page/region orientation, skew and script on an image.
    ///
    /// `dpi` carries the effective pixel density when one is known.
    fn detect_orientation(
        &self,
        image: &RgbImage,
        dpi: Option<f32>,
    ) -> PipelineResult<OrientationHypothesis>;

    /// Detects the printed-area border of a page image.
    fn detect_border(&self, image: &RgbImage) -> PipelineResult<BoundingBox>;

    /// Computes a global binarization threshold for an image.
    fn binarize_threshold(&self, image: &RgbImage) -> PipelineResult<u8>;

    /// Detects layout regions on a page image.
    fn detect_regions(
        &self,
        image: &RgbImage,
        opts: &RegionDetectionOptions,
    ) -> PipelineResult<Vec<RegionHypothesis>>;

    /// Detects cell geometries inside a table region image.
    fn detect_table_cells(&self, image: &RgbImage) -> PipelineResult<Vec<Geometry>>;

    /// Detects text line geometries inside a region image.
    fn detect_lines(&self, image: &RgbImage) -> PipelineResult<Vec<Geometry>>;

    /// Detects word geometries inside a line image.
    fn detect_words(&self, image: &RgbImage) -> PipelineResult<Vec<Geometry>>;

    /// Recognizes text on an image, restricted by the character filter.
    ///
    /// Returns one span per recognized unit; span geometries, when
    /// present, are relative to `image`.
    fn recognize(
        &self,
        image: &RgbImage,
        model: Option<&str>,
        filter: &CharFilter,
    ) -> PipelineResult<Vec<RecognizedSpan>>;

    /// Returns true when this engine cannot operate without a known pixel
    /// density. Stages skip nodes with unknown DPI for such engines.
    fn needs_dpi(&self) -> bool {
        false
    }
}
