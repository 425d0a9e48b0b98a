//! Image upload validation: type, extension, size, decode, orient, resize

use image::{imageops::FilterType, metadata::Orientation, DynamicImage, ImageDecoder, ImageReader, RgbImage};
use std::io::Cursor;
use tracing::{debug, error};

use crate::config::ImageConfig;
use crate::error::{AppError, Result};
use crate::validation::{format_allowed, RawUpload};

/// Validate the uploaded image and return the decoded, orientation-corrected
/// RGB image, shrunk (never enlarged) to fit the configured bounds.
pub fn validate_image(upload: &RawUpload, settings: &ImageConfig) -> Result<RgbImage> {
    let content_type = upload.content_type.as_deref().unwrap_or("");
    if !settings.allowed_types.contains(content_type) {
        let err = AppError::InvalidImageType {
            got: content_type.to_string(),
            allowed: format_allowed(&settings.allowed_types),
        };
        error!(stage = "validate_image", %err, "rejected upload");
        return Err(err);
    }

    let extension = upload.extension().unwrap_or_default();
    if !settings.allowed_extensions.contains(&extension) {
        let err = AppError::InvalidImageExtension {
            got: upload.filename.clone().unwrap_or_default(),
            allowed: format_allowed(&settings.allowed_extensions),
        };
        error!(stage = "validate_image", %err, "rejected upload");
        return Err(err);
    }

    if upload.bytes.len() > settings.max_file_size {
        let err = AppError::ImageTooLarge {
            size: upload.bytes.len(),
            max: settings.max_file_size,
        };
        error!(stage = "validate_image", %err, "rejected upload");
        return Err(err);
    }

    let image = decode_oriented(&upload.bytes)?;
    Ok(shrink_to_fit(image, settings.max_width, settings.max_height))
}

/// Decode bytes and apply the EXIF orientation the decoder reports
fn decode_oriented(bytes: &[u8]) -> Result<DynamicImage> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(AppError::Io)?;
    let mut decoder = reader
        .into_decoder()
        .map_err(|e| AppError::UnsupportedImageFormat(e.to_string()))?;
    let orientation = decoder
        .orientation()
        .unwrap_or(Orientation::NoTransforms);
    let mut image = DynamicImage::from_decoder(decoder)
        .map_err(|e| AppError::UnsupportedImageFormat(e.to_string()))?;
    image.apply_orientation(orientation);
    Ok(image)
}

/// Convert to RGB8 and shrink to fit within (max_width, max_height),
/// preserving aspect ratio. Smaller images pass through untouched.
fn shrink_to_fit(image: DynamicImage, max_width: u32, max_height: u32) -> RgbImage {
    let rgb = image.into_rgb8();
    let (width, height) = rgb.dimensions();
    if width <= max_width && height <= max_height {
        return rgb;
    }
    debug!(width, height, max_width, max_height, "downscaling image");
    DynamicImage::ImageRgb8(rgb)
        .resize(max_width, max_height, FilterType::Lanczos3)
        .into_rgb8()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_upload(width: u32, height: u32) -> RawUpload {
        let image = RgbImage::from_pixel(width, height, image::Rgb([1, 2, 3]));
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        RawUpload {
            bytes,
            content_type: Some("image/png".to_string()),
            filename: Some("input.png".to_string()),
        }
    }

    #[test]
    fn test_accepts_valid_png() {
        let settings = ImageConfig::default();
        let image = validate_image(&png_upload(8, 6), &settings).unwrap();
        assert_eq!(image.dimensions(), (8, 6));
    }

    #[test]
    fn test_rejects_wrong_content_type() {
        let settings = ImageConfig::default();
        let mut upload = png_upload(8, 6);
        upload.content_type = Some("text/plain".to_string());
        let err = validate_image(&upload, &settings).unwrap_err();
        assert!(matches!(err, AppError::InvalidImageType { .. }));
        assert!(err.to_string().contains("text/plain"));
    }

    #[test]
    fn test_rejects_wrong_extension() {
        let settings = ImageConfig::default();
        let mut upload = png_upload(8, 6);
        upload.filename = Some("input.txt".to_string());
        assert!(matches!(
            validate_image(&upload, &settings).unwrap_err(),
            AppError::InvalidImageExtension { .. }
        ));
    }

    #[test]
    fn test_extension_check_is_case_insensitive() {
        let settings = ImageConfig::default();
        let mut upload = png_upload(8, 6);
        upload.filename = Some("INPUT.PNG".to_string());
        assert!(validate_image(&upload, &settings).is_ok());
    }

    #[test]
    fn test_rejects_oversized_file() {
        let mut settings = ImageConfig::default();
        settings.max_file_size = 10;
        assert!(matches!(
            validate_image(&png_upload(8, 6), &settings).unwrap_err(),
            AppError::ImageTooLarge { .. }
        ));
    }

    #[test]
    fn test_rejects_undecodable_bytes() {
        let settings = ImageConfig::default();
        let upload = RawUpload {
            bytes: b"definitely not an image".to_vec(),
            content_type: Some("image/png".to_string()),
            filename: Some("input.png".to_string()),
        };
        assert!(matches!(
            validate_image(&upload, &settings).unwrap_err(),
            AppError::UnsupportedImageFormat(_)
        ));
    }

    #[test]
    fn test_large_image_is_shrunk_preserving_aspect() {
        let mut settings = ImageConfig::default();
        settings.max_width = 100;
        settings.max_height = 100;

        let image = validate_image(&png_upload(800, 600), &settings).unwrap();
        let (width, height) = image.dimensions();
        assert!(width <= 100 && height <= 100);
        // 4:3 input stays 4:3.
        assert_eq!((width, height), (100, 75));
    }

    #[test]
    fn test_small_image_is_never_upscaled() {
        let mut settings = ImageConfig::default();
        settings.max_width = 1024;
        settings.max_height = 1024;

        let image = validate_image(&png_upload(8, 6), &settings).unwrap();
        assert_eq!(image.dimensions(), (8, 6));
    }
}
