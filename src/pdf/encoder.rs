//! JPEG encoding of rendered page surfaces

use image::RgbImage;
use image::codecs::jpeg::JpegEncoder;

use super::request::CompressError;
use super::types::{EncodedPage, PageSurface};

/// Encode a rendered page as baseline JPEG.
///
/// The surface is consumed so its pixel buffer is released as soon as the
/// JPEG bytes exist.
pub fn encode(
    surface: PageSurface,
    page_index: usize,
    jpeg_quality: u8,
) -> Result<EncodedPage, CompressError> {
    let expected = surface.expected_len();
    let PageSurface {
        width_px,
        height_px,
        pixels,
    } = surface;

    if width_px == 0 || height_px == 0 {
        return Err(CompressError::encode(page_index, "empty surface"));
    }

    let actual = pixels.len();
    let rgb = RgbImage::from_raw(width_px, height_px, pixels).ok_or_else(|| {
        CompressError::encode(
            page_index,
            format!("pixel buffer holds {actual} bytes, expected {expected}"),
        )
    })?;

    let mut bytes = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut bytes, jpeg_quality.clamp(1, 100));
    rgb.write_with_encoder(encoder)
        .map_err(|e| CompressError::encode(page_index, e))?;

    Ok(EncodedPage {
        page_index,
        bytes,
        width_px,
        height_px,
    })
}
