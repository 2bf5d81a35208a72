//! Geometry primitives and raster operators.

pub mod geometry;
pub mod raster;

pub use geometry::{BoundingBox, Geometry, Point, Polygon};
