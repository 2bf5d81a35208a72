//! Utility functions for loading and converting images.

use image::{DynamicImage, RgbImage};

use crate::core::errors::{PipelineError, PipelineResult};

/// Converts a DynamicImage to an RgbImage.
pub fn dynamic_to_rgb(img: DynamicImage) -> RgbImage {
    img.to_rgb8()
}

/// Loads an image from a file path and converts it to RgbImage.
///
/// # Errors
///
/// Returns `PipelineError::ImageLoad` if the image cannot be decoded.
pub fn load_image(path: &std::path::Path) -> PipelineResult<RgbImage> {
    let img = image::open(path).map_err(PipelineError::ImageLoad)?;
    Ok(dynamic_to_rgb(img))
}
