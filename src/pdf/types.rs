//! Core types for the recompression pipeline

use super::estimate::savings_percent;
use super::policy::{CompressionLevel, RenderSettings};

/// A compression job as submitted by the caller.
///
/// The source buffer is moved into the pipeline; there is no way to get it
/// back once a request has been accepted.
#[derive(Clone)]
pub struct CompressionRequest {
    pub source_bytes: Vec<u8>,
    pub level: CompressionLevel,
    pub fast_mode: bool,
}

impl CompressionRequest {
    #[must_use]
    pub fn new(source_bytes: Vec<u8>, level: CompressionLevel, fast_mode: bool) -> Self {
        Self {
            source_bytes,
            level,
            fast_mode,
        }
    }
}

impl std::fmt::Debug for CompressionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompressionRequest")
            .field("source_len", &self.source_bytes.len())
            .field("level", &self.level)
            .field("fast_mode", &self.fast_mode)
            .finish()
    }
}

/// Raw rendered page before JPEG encoding.
///
/// Opaque RGB, 3 bytes per pixel, rows packed without padding.
pub struct PageSurface {
    pub width_px: u32,
    pub height_px: u32,
    pub pixels: Vec<u8>,
}

impl PageSurface {
    /// Solid white surface of the given size
    #[must_use]
    pub fn blank(width_px: u32, height_px: u32) -> Self {
        Self {
            width_px,
            height_px,
            pixels: vec![0xFF; width_px as usize * height_px as usize * 3],
        }
    }

    /// Number of bytes a packed RGB buffer of this size must have
    #[must_use]
    pub fn expected_len(&self) -> usize {
        self.width_px as usize * self.height_px as usize * 3
    }
}

impl std::fmt::Debug for PageSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageSurface")
            .field("width_px", &self.width_px)
            .field("height_px", &self.height_px)
            .field("pixels_len", &self.pixels.len())
            .finish()
    }
}

/// JPEG-encoded page, ready to be embedded in the output document
#[derive(Clone)]
pub struct EncodedPage {
    /// Source page index (0-based)
    pub page_index: usize,
    pub bytes: Vec<u8>,
    pub width_px: u32,
    pub height_px: u32,
}

impl std::fmt::Debug for EncodedPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodedPage")
            .field("page_index", &self.page_index)
            .field("bytes_len", &self.bytes.len())
            .field("width_px", &self.width_px)
            .field("height_px", &self.height_px)
            .finish()
    }
}

/// Terminal value of a successful request
#[derive(Clone)]
pub struct CompressionResult {
    pub pdf_bytes: Vec<u8>,
    pub original_size: usize,
    /// Always `pdf_bytes.len()`
    pub compressed_size: usize,
    /// Pages in the output document
    pub page_count: usize,
    /// Source pages left out because they failed to render or encode
    pub skipped_pages: Vec<usize>,
    pub settings: RenderSettings,
}

impl CompressionResult {
    #[must_use]
    pub fn new(
        pdf_bytes: Vec<u8>,
        original_size: usize,
        page_count: usize,
        skipped_pages: Vec<usize>,
        settings: RenderSettings,
    ) -> Self {
        let compressed_size = pdf_bytes.len();
        Self {
            pdf_bytes,
            original_size,
            compressed_size,
            page_count,
            skipped_pages,
            settings,
        }
    }

    /// Size reduction in percent; negative when the output grew
    #[must_use]
    pub fn savings_percent(&self) -> i64 {
        savings_percent(self.original_size, self.compressed_size)
    }
}

impl std::fmt::Debug for CompressionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompressionResult")
            .field("original_size", &self.original_size)
            .field("compressed_size", &self.compressed_size)
            .field("page_count", &self.page_count)
            .field("skipped_pages", &self.skipped_pages)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Progress notification, 0..=100
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct ProgressEvent {
    pub percent: f32,
}

impl ProgressEvent {
    #[must_use]
    pub const fn new(percent: f32) -> Self {
        Self { percent }
    }
}
