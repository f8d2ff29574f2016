use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use std::io::Read;
use thiserror::Error;

pub const THUMBNAIL_HEIGHT: u32 = 200;
pub const JPEG_QUALITY: u8 = 70;
pub const DATA_URI_PREFIX: &str = "data:image/jpeg;base64,";

#[derive(Debug, Error)]
pub enum ThumbnailError {
    #[error("failed to read source image")]
    Read(#[source] std::io::Error),
    #[error("failed to decode source image")]
    Decode(#[source] image::ImageError),
    #[error("source image has zero height")]
    Empty,
    #[error("failed to encode thumbnail")]
    Encode(#[source] image::ImageError),
}

/// Width that keeps the aspect ratio at [`THUMBNAIL_HEIGHT`], never below one pixel.
pub fn thumbnail_width(width: u32, height: u32) -> u32 {
    if height == 0 {
        return 1;
    }
    let scaled = (f64::from(width) * f64::from(THUMBNAIL_HEIGHT) / f64::from(height)).round();
    (scaled as u32).max(1)
}

pub fn generate(mut source: impl Read) -> Result<String, ThumbnailError> {
    let mut bytes = Vec::new();
    source.read_to_end(&mut bytes).map_err(ThumbnailError::Read)?;

    let decoded = image::load_from_memory(&bytes).map_err(ThumbnailError::Decode)?;
    if decoded.height() == 0 {
        return Err(ThumbnailError::Empty);
    }
    let width = thumbnail_width(decoded.width(), decoded.height());
    let rgb = decoded
        .resize_exact(width, THUMBNAIL_HEIGHT, FilterType::Triangle)
        .to_rgb8();

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY)
        .encode_image(&rgb)
        .map_err(ThumbnailError::Encode)?;

    Ok(format!("{DATA_URI_PREFIX}{}", BASE64_STANDARD.encode(jpeg)))
}
