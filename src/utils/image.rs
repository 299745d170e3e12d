//! Image utility functions

use anyhow::Result;
use image::DynamicImage;

/// Decode image from bytes (JPEG, PNG, etc.)
pub fn decode_image(data: &[u8]) -> Result<DynamicImage> {
    let img = image::load_from_memory(data)?;
    Ok(img)
}
