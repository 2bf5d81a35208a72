//! Raster operators: cropping, polygon masking and binarization.
//!
//! Stages hand the external engine per-node subimages. A node with a
//! rectangular geometry is cropped; a node with a native polygon is
//! cropped to its envelope and the pixels outside the polygon are set to
//! background so the engine never sees neighbouring content.

use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::drawing::draw_polygon_mut;
use imageproc::point::Point as ImageProcPoint;

use crate::core::errors::{PipelineError, PipelineResult};
use crate::processors::geometry::{BoundingBox, Polygon};

/// Background color used for masked-out pixels.
const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

/// Crops `image` to the pixel rectangle covered by `bbox`.
///
/// The box is clamped to the image bounds first; a box with no remaining
/// extent fails with a geometry error.
pub fn crop(image: &RgbImage, bbox: &BoundingBox) -> PipelineResult<RgbImage> {
    let (img_w, img_h) = image.dimensions();
    let x0 = (bbox.x0.floor().max(0.0) as u32).min(img_w);
    let y0 = (bbox.y0.floor().max(0.0) as u32).min(img_h);
    let x1 = (bbox.x1.ceil().max(0.0) as u32).min(img_w);
    let y1 = (bbox.y1.ceil().max(0.0) as u32).min(img_h);

    if x0 >= x1 || y0 >= y1 {
        return Err(PipelineError::geometry(format!(
            "crop rectangle {:?} has no extent within a {}x{} image",
            bbox, img_w, img_h
        )));
    }

    Ok(image::imageops::crop_imm(image, x0, y0, x1 - x0, y1 - y0).to_image())
}

/// Crops `image` to the polygon's envelope and sets the pixels outside
/// the polygon to background.
pub fn mask(image: &RgbImage, polygon: &Polygon) -> PipelineResult<RgbImage> {
    let bbox = polygon.to_bbox();
    let mut cropped = crop(image, &bbox)?;

    // Polygon vertices in crop-local coordinates, deduplicated for the
    // rasterizer (which rejects a closing vertex equal to the first).
    let local = polygon.translate(-bbox.x0.floor().max(0.0), -bbox.y0.floor().max(0.0));
    let mut vertices: Vec<ImageProcPoint<i32>> =
        local.points.iter().map(|p| p.to_imageproc_point()).collect();
    vertices.dedup();
    if vertices.len() > 1 && vertices.first() == vertices.last() {
        vertices.pop();
    }
    if vertices.len() < 3 {
        // Degenerate outline: the envelope crop is the best we can do.
        return Ok(cropped);
    }

    let mut stencil = GrayImage::new(cropped.width(), cropped.height());
    draw_polygon_mut(&mut stencil, &vertices, Luma([255u8]));

    for (x, y, pixel) in cropped.enumerate_pixels_mut() {
        if stencil.get_pixel(x, y)[0] == 0 {
            *pixel = BACKGROUND;
        }
    }

    Ok(cropped)
}

/// Applies a global threshold to `image`, producing a black/white image.
///
/// Pixels with luma at or above `threshold` become white, the rest black.
pub fn apply_threshold(image: &RgbImage, threshold: u8) -> RgbImage {
    let mut out = RgbImage::new(image.width(), image.height());
    for (src, dst) in image.pixels().zip(out.pixels_mut()) {
        // ITU-R BT.601 luma, same weighting the image crate uses.
        let luma = 0.299 * src[0] as f32 + 0.587 * src[1] as f32 + 0.114 * src[2] as f32;
        *dst = if luma as u8 >= threshold {
            Rgb([255, 255, 255])
        } else {
            Rgb([0, 0, 0])
        };
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::geometry::Point;

    fn checker_image(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            if (x + y) % 2 == 0 {
                Rgb([0, 0, 0])
            } else {
                Rgb([200, 200, 200])
            }
        })
    }

    #[test]
    fn test_crop_clamps_to_image() {
        let img = checker_image(100, 80);
        let cropped = crop(&img, &BoundingBox::new(-10.0, -10.0, 50.0, 200.0)).unwrap();
        assert_eq!(cropped.dimensions(), (50, 80));
    }

    #[test]
    fn test_crop_zero_extent_fails() {
        let img = checker_image(100, 80);
        assert!(crop(&img, &BoundingBox::new(20.0, 20.0, 20.0, 60.0)).is_err());
        assert!(crop(&img, &BoundingBox::new(200.0, 0.0, 300.0, 50.0)).is_err());
    }

    #[test]
    fn test_mask_blanks_outside_polygon() {
        let img = RgbImage::from_pixel(40, 40, Rgb([10, 10, 10]));
        let triangle = Polygon::new(vec![
            Point::new(0.0, 0.0),
            Point::new(39.0, 0.0),
            Point::new(0.0, 39.0),
        ]);
        let masked = mask(&img, &triangle).unwrap();
        assert_eq!(masked.dimensions(), (40, 40));
        // inside the triangle keeps content, the far corner is background
        assert_eq!(*masked.get_pixel(1, 1), Rgb([10, 10, 10]));
        assert_eq!(*masked.get_pixel(39, 39), BACKGROUND);
    }

    #[test]
    fn test_apply_threshold() {
        let img = checker_image(4, 4);
        let bin = apply_threshold(&img, 128);
        assert_eq!(*bin.get_pixel(0, 0), Rgb([0, 0, 0]));
        assert_eq!(*bin.get_pixel(1, 0), Rgb([255, 255, 255]));
    }
}
