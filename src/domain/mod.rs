//! Domain types: the document annotation tree, hierarchy levels, the
//! level-overwrite policy and engine hypothesis types.

pub mod hypotheses;
pub mod level;
pub mod overwrite;
pub mod tree;

pub use hypotheses::{
    CharFilter, OrientationHypothesis, RecognizedSpan, RegionDetectionOptions, RegionHypothesis,
};
pub use level::Level;
pub use tree::{
    Document, GlyphAttrs, ImageRef, LineAttrs, Node, NodeData, NodeId, PageAttrs, RegionAttrs,
    RegionKind, TextEquiv, WordAttrs,
};
