//! Geometric primitives for layout processing.
//!
//! This module provides the point, axis-aligned box and polygon types used
//! throughout the document tree, plus the padding, clipping, translation
//! and rotation operators the stages need for coordinate normalization.
//!
//! Polygon-to-box conversion is lossy and one-directional; the document
//! tree retains whichever form the detecting stage produced natively (see
//! [`Geometry`]) instead of round-tripping.

use imageproc::point::Point as ImageProcPoint;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::core::errors::{PipelineError, PipelineResult};

/// A 2D point with floating-point coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// X-coordinate of the point.
    pub x: f32,
    /// Y-coordinate of the point.
    pub y: f32,
}

impl Point {
    /// Creates a new point with the given coordinates.
    #[inline]
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Converts this point to an imageproc point with integer coordinates.
    pub fn to_imageproc_point(&self) -> ImageProcPoint<i32> {
        ImageProcPoint::new(self.x as i32, self.y as i32)
    }

    /// Rotates this point clockwise by `degrees` around `center`.
    pub fn rotate_about(&self, center: Point, degrees: f32) -> Point {
        let rad = degrees.to_radians();
        let (sin, cos) = (rad.sin(), rad.cos());
        let dx = self.x - center.x;
        let dy = self.y - center.y;
        Point::new(
            center.x + dx * cos - dy * sin,
            center.y + dx * sin + dy * cos,
        )
    }
}

/// An axis-aligned bounding box.
///
/// Coordinates are normalized on construction so that `x0 <= x1` and
/// `y0 <= y1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BoundingBox {
    /// Creates a bounding box from two corner coordinates.
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    /// Width of the box.
    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    /// Height of the box.
    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    /// Area of the box.
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Center point of the box.
    pub fn center(&self) -> Point {
        Point::new((self.x0 + self.x1) / 2.0, (self.y0 + self.y1) / 2.0)
    }

    /// Returns the intersection of two boxes, or None if they are disjoint.
    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        let x0 = self.x0.max(other.x0);
        let y0 = self.y0.max(other.y0);
        let x1 = self.x1.min(other.x1);
        let y1 = self.y1.min(other.y1);
        if x0 < x1 && y0 < y1 {
            Some(BoundingBox { x0, y0, x1, y1 })
        } else {
            None
        }
    }

    /// Returns true if `other` lies fully inside this box.
    pub fn contains(&self, other: &BoundingBox) -> bool {
        self.x0 <= other.x0 && self.y0 <= other.y0 && self.x1 >= other.x1 && self.y1 >= other.y1
    }

    /// Expands the box by `n` units on every side.
    pub fn expand(&self, n: f32) -> BoundingBox {
        BoundingBox::new(self.x0 - n, self.y0 - n, self.x1 + n, self.y1 + n)
    }

    /// Translates the box by the given offsets.
    pub fn translate(&self, dx: f32, dy: f32) -> BoundingBox {
        BoundingBox {
            x0: self.x0 + dx,
            y0: self.y0 + dy,
            x1: self.x1 + dx,
            y1: self.y1 + dy,
        }
    }

    /// Converts this box to its four corner points, clockwise from the
    /// top-left in image coordinates.
    pub fn to_polygon(&self) -> Polygon {
        Polygon::new(vec![
            Point::new(self.x0, self.y0),
            Point::new(self.x1, self.y0),
            Point::new(self.x1, self.y1),
            Point::new(self.x0, self.y1),
        ])
    }

    /// Returns true if the box has no usable extent.
    pub fn is_degenerate(&self) -> bool {
        self.width() < 1.0 || self.height() < 1.0
    }
}

/// A closed polygon represented by its vertices.
///
/// The last point is implicitly connected to the first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    /// The vertices of the polygon.
    pub points: Vec<Point>,
}

impl Polygon {
    /// Creates a new polygon from a vector of vertices.
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    /// Computes the axis-aligned envelope of the polygon.
    ///
    /// Returns a zero-sized box at the origin for an empty polygon.
    pub fn to_bbox(&self) -> BoundingBox {
        let Some((x0, x1)) = self.points.iter().map(|p| p.x).minmax().into_option() else {
            return BoundingBox::new(0.0, 0.0, 0.0, 0.0);
        };
        let Some((y0, y1)) = self.points.iter().map(|p| p.y).minmax().into_option() else {
            return BoundingBox::new(0.0, 0.0, 0.0, 0.0);
        };
        BoundingBox::new(x0, y0, x1, y1)
    }

    /// Calculates the area of the polygon using the shoelace formula.
    ///
    /// Returns 0.0 if the polygon has fewer than 3 points.
    pub fn area(&self) -> f32 {
        if self.points.len() < 3 {
            return 0.0;
        }

        let mut area = 0.0;
        let n = self.points.len();
        for i in 0..n {
            let j = (i + 1) % n;
            area += self.points[i].x * self.points[j].y;
            area -= self.points[j].x * self.points[i].y;
        }
        area.abs() / 2.0
    }

    /// Translates every vertex by the given offsets.
    pub fn translate(&self, dx: f32, dy: f32) -> Polygon {
        Polygon::new(
            self.points
                .iter()
                .map(|p| Point::new(p.x + dx, p.y + dy))
                .collect(),
        )
    }

    /// Rotates every vertex clockwise by `degrees` around `center`.
    pub fn rotate_about(&self, center: Point, degrees: f32) -> Polygon {
        Polygon::new(
            self.points
                .iter()
                .map(|p| p.rotate_about(center, degrees))
                .collect(),
        )
    }

    /// Expands the polygon outward by `n` units.
    ///
    /// Each vertex is displaced away from the centroid so that the
    /// envelope grows by at least `n` on every side. Exact offsetting is
    /// not required here: padded geometries are clipped to their parent
    /// bound immediately afterwards.
    pub fn expand(&self, n: f32) -> Polygon {
        if self.points.is_empty() || n == 0.0 {
            return self.clone();
        }

        let count = self.points.len() as f32;
        let center_x = self.points.iter().map(|p| p.x).sum::<f32>() / count;
        let center_y = self.points.iter().map(|p| p.y).sum::<f32>() / count;

        let expanded = self
            .points
            .iter()
            .map(|point| {
                let dx = point.x - center_x;
                let dy = point.y - center_y;
                let dist = (dx * dx + dy * dy).sqrt();
                if dist > f32::EPSILON {
                    let expansion = (dist + n) / dist;
                    Point::new(center_x + dx * expansion, center_y + dy * expansion)
                } else {
                    *point
                }
            })
            .collect();

        Polygon::new(expanded)
    }

    /// Clips every vertex to the given bound.
    pub fn clip_to(&self, bound: &BoundingBox) -> Polygon {
        Polygon::new(
            self.points
                .iter()
                .map(|p| Point::new(p.x.clamp(bound.x0, bound.x1), p.y.clamp(bound.y0, bound.y1)))
                .collect(),
        )
    }
}

/// A node geometry, retaining the form the detecting stage produced.
///
/// Region detectors may report axis-aligned boxes or free polygons; both
/// forms flow through the tree unchanged. `bbox()` derives the envelope
/// on demand, `polygon()` derives corner points for rectangles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Geometry {
    /// An axis-aligned rectangle.
    Rect(BoundingBox),
    /// A free polygon.
    Poly(Polygon),
}

impl Geometry {
    /// The axis-aligned envelope of this geometry.
    pub fn bbox(&self) -> BoundingBox {
        match self {
            Geometry::Rect(b) => *b,
            Geometry::Poly(p) => p.to_bbox(),
        }
    }

    /// The polygon form of this geometry (4 clockwise corners for
    /// rectangles).
    pub fn polygon(&self) -> Polygon {
        match self {
            Geometry::Rect(b) => b.to_polygon(),
            Geometry::Poly(p) => p.clone(),
        }
    }

    /// Returns true if this geometry carries a native (non-rectangular)
    /// polygon.
    pub fn is_polygon(&self) -> bool {
        matches!(self, Geometry::Poly(_))
    }

    /// Returns true if the geometry has no usable area.
    pub fn is_degenerate(&self) -> bool {
        match self {
            Geometry::Rect(b) => b.is_degenerate(),
            Geometry::Poly(p) => p.points.len() < 3 || p.area() < 1.0,
        }
    }

    /// Translates the geometry by the given offsets.
    pub fn translate(&self, dx: f32, dy: f32) -> Geometry {
        match self {
            Geometry::Rect(b) => Geometry::Rect(b.translate(dx, dy)),
            Geometry::Poly(p) => Geometry::Poly(p.translate(dx, dy)),
        }
    }

    /// Rotates the geometry clockwise by `degrees` around `center`.
    ///
    /// A rectangle rotated by a non-right angle keeps its axis-aligned
    /// form by taking the envelope of the rotated corners.
    pub fn rotate_about(&self, center: Point, degrees: f32) -> Geometry {
        match self {
            Geometry::Rect(b) => {
                Geometry::Rect(b.to_polygon().rotate_about(center, degrees).to_bbox())
            }
            Geometry::Poly(p) => Geometry::Poly(p.rotate_about(center, degrees)),
        }
    }

    /// Expands the geometry by `n` units on every side, then clips it to
    /// an optional parent bound.
    ///
    /// Fails with a geometry error when the padded result lies fully
    /// outside the parent bound.
    pub fn pad(&self, n: f32, clip: Option<&BoundingBox>) -> PipelineResult<Geometry> {
        let padded = match self {
            Geometry::Rect(b) => Geometry::Rect(b.expand(n)),
            Geometry::Poly(p) => Geometry::Poly(p.expand(n)),
        };

        let Some(bound) = clip else {
            return Ok(padded);
        };

        if padded.bbox().intersection(bound).is_none() {
            return Err(PipelineError::geometry(format!(
                "padded geometry {:?} lies outside parent bound {:?}",
                padded.bbox(),
                bound
            )));
        }

        Ok(match padded {
            Geometry::Rect(b) => Geometry::Rect(
                b.intersection(bound)
                    .expect("intersection checked just above"),
            ),
            Geometry::Poly(p) => Geometry::Poly(p.clip_to(bound)),
        })
    }
}

impl From<BoundingBox> for Geometry {
    fn from(b: BoundingBox) -> Self {
        Geometry::Rect(b)
    }
}

impl From<Polygon> for Geometry {
    fn from(p: Polygon) -> Self {
        Geometry::Poly(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_normalization() {
        let b = BoundingBox::new(10.0, 20.0, 5.0, 2.0);
        assert_eq!(b.x0, 5.0);
        assert_eq!(b.y0, 2.0);
        assert_eq!(b.x1, 10.0);
        assert_eq!(b.y1, 20.0);
    }

    #[test]
    fn test_bbox_polygon_roundtrip_envelope() {
        let b = BoundingBox::new(1.0, 2.0, 11.0, 22.0);
        let poly = b.to_polygon();
        assert_eq!(poly.points.len(), 4);
        assert_eq!(poly.to_bbox(), b);
        // clockwise in image coordinates: top-left first
        assert_eq!(poly.points[0], Point::new(1.0, 2.0));
        assert_eq!(poly.points[1], Point::new(11.0, 2.0));
    }

    #[test]
    fn test_pad_containment_property() {
        // For all geometries g and padding n >= 0:
        // bbox(pad(polygon(g), n)) contains bbox(g).
        let cases = vec![
            Geometry::Rect(BoundingBox::new(10.0, 10.0, 50.0, 30.0)),
            Geometry::Poly(Polygon::new(vec![
                Point::new(12.0, 9.0),
                Point::new(48.0, 14.0),
                Point::new(45.0, 33.0),
                Point::new(10.0, 28.0),
            ])),
        ];
        for g in cases {
            for n in [0.0_f32, 1.0, 4.0, 17.5] {
                let padded = Geometry::Poly(g.polygon()).pad(n, None).unwrap();
                assert!(
                    padded.bbox().contains(&g.bbox()),
                    "pad({n}) must contain the original envelope"
                );
            }
        }
    }

    #[test]
    fn test_pad_clips_to_parent() {
        let g = Geometry::Rect(BoundingBox::new(0.0, 0.0, 100.0, 100.0));
        let parent = BoundingBox::new(0.0, 0.0, 80.0, 80.0);
        let padded = g.pad(10.0, Some(&parent)).unwrap();
        assert_eq!(padded.bbox(), parent);
    }

    #[test]
    fn test_pad_outside_parent_fails() {
        let g = Geometry::Rect(BoundingBox::new(200.0, 200.0, 220.0, 220.0));
        let parent = BoundingBox::new(0.0, 0.0, 100.0, 100.0);
        assert!(g.pad(2.0, Some(&parent)).is_err());
    }

    #[test]
    fn test_polygon_area_shoelace() {
        let poly = Polygon::new(vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
        ]);
        assert_eq!(poly.area(), 100.0);
    }

    #[test]
    fn test_rotate_right_angle() {
        let b = BoundingBox::new(0.0, 0.0, 10.0, 20.0);
        let rotated = Geometry::Rect(b).rotate_about(b.center(), 90.0);
        let rb = rotated.bbox();
        assert!((rb.width() - 20.0).abs() < 1e-3);
        assert!((rb.height() - 10.0).abs() < 1e-3);
    }

    #[test]
    fn test_degenerate_geometry() {
        assert!(BoundingBox::new(5.0, 5.0, 5.0, 5.0).is_degenerate());
        assert!(Geometry::Poly(Polygon::new(vec![])).is_degenerate());
        assert!(!Geometry::Rect(BoundingBox::new(0.0, 0.0, 2.0, 2.0)).is_degenerate());
    }

    #[test]
    fn test_translate() {
        let g = Geometry::Rect(BoundingBox::new(1.0, 1.0, 3.0, 3.0)).translate(10.0, 20.0);
        assert_eq!(g.bbox(), BoundingBox::new(11.0, 21.0, 13.0, 23.0));
    }
}
