//! Canonical wire encoding of transformed images

use image::RgbImage;
use std::io::Cursor;

use crate::error::{AppError, Result};

/// Content type of every successful response body
pub const CONTENT_TYPE: &str = "image/png";

/// Encode the transformed image into the canonical PNG wire format
pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .map_err(|e| AppError::Internal(format!("failed to encode result image: {e}")))?;
    Ok(bytes)
}
