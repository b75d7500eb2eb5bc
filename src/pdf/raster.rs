//! Page rasterization
//!
//! [`DocumentLoader`] parses source bytes into a [`PageDocument`] that can
//! paint its pages into RGB surfaces. The production implementation is backed
//! by MuPDF; tests use the scripted loader from `test_utils`.

use super::request::CompressError;
use super::types::PageSurface;

/// Longest side, in pixels, a rendered page may have
pub const MAX_SURFACE_SIDE: u32 = 32_767;

/// Largest pixel area of a rendered page (16384 x 16384)
pub const MAX_SURFACE_AREA: u64 = 16_384 * 16_384;

/// Parses PDF bytes. Shared across threads; the documents it opens are not.
pub trait DocumentLoader: Send + Sync {
    /// Fails with [`CompressError::CorruptDocument`] when the bytes are not a
    /// readable, unlocked PDF with at least one page.
    fn open(&self, bytes: &[u8]) -> Result<Box<dyn PageDocument>, CompressError>;
}

/// An open document, used from a single thread for the whole request
pub trait PageDocument {
    fn page_count(&self) -> usize;

    /// Paint one page onto an opaque white surface at `scale` pixels per
    /// point.
    fn render_page(&self, page_index: usize, scale: f32) -> Result<PageSurface, CompressError>;
}

/// Pixel size of a page of `width_pt` x `height_pt` points at `scale`.
///
/// Rejects pages that would be empty, longer than [`MAX_SURFACE_SIDE`] on a
/// side or larger than [`MAX_SURFACE_AREA`] in total.
pub fn surface_size(
    page_index: usize,
    width_pt: f32,
    height_pt: f32,
    scale: f32,
) -> Result<(u32, u32), CompressError> {
    let width = (width_pt * scale).round();
    let height = (height_pt * scale).round();

    if !width.is_finite() || !height.is_finite() || width < 1.0 || height < 1.0 {
        return Err(CompressError::render(
            page_index,
            format!("page has no drawable area ({width_pt}x{height_pt} pt)"),
        ));
    }
    let max_side = MAX_SURFACE_SIDE as f32;
    if width > max_side || height > max_side {
        return Err(CompressError::render(
            page_index,
            format!("surface of {width}x{height} px exceeds {MAX_SURFACE_SIDE} px per side"),
        ));
    }

    let (width, height) = (width as u32, height as u32);
    let area = u64::from(width) * u64::from(height);
    if area > MAX_SURFACE_AREA {
        return Err(CompressError::render(
            page_index,
            format!("surface of {width}x{height} px exceeds {MAX_SURFACE_AREA} px area"),
        ));
    }

    Ok((width, height))
}

#[cfg(feature = "pdf")]
pub use self::mupdf_backend::MupdfLoader;

#[cfg(feature = "pdf")]
mod mupdf_backend {
    use mupdf::{Colorspace, Document, Matrix, Pixmap};

    use super::{DocumentLoader, PageDocument, surface_size};
    use crate::pdf::request::CompressError;
    use crate::pdf::types::PageSurface;

    const PDF_MAGIC: &str = "application/pdf";

    /// [`DocumentLoader`] backed by MuPDF
    #[derive(Clone, Copy, Debug, Default)]
    pub struct MupdfLoader;

    impl DocumentLoader for MupdfLoader {
        fn open(&self, bytes: &[u8]) -> Result<Box<dyn PageDocument>, CompressError> {
            if bytes.is_empty() {
                return Err(CompressError::corrupt("input is empty"));
            }

            let doc = Document::from_bytes(bytes, PDF_MAGIC)
                .map_err(|e| CompressError::corrupt(e.to_string()))?;

            if doc
                .needs_password()
                .map_err(|e| CompressError::corrupt(e.to_string()))?
            {
                return Err(CompressError::corrupt("document is password protected"));
            }

            let page_count = doc
                .page_count()
                .map_err(|e| CompressError::corrupt(e.to_string()))?;
            if page_count <= 0 {
                return Err(CompressError::corrupt("document has no pages"));
            }

            Ok(Box::new(MupdfDocument {
                doc,
                page_count: page_count as usize,
            }))
        }
    }

    struct MupdfDocument {
        doc: Document,
        page_count: usize,
    }

    impl PageDocument for MupdfDocument {
        fn page_count(&self) -> usize {
            self.page_count
        }

        fn render_page(
            &self,
            page_index: usize,
            scale: f32,
        ) -> Result<PageSurface, CompressError> {
            let render_err = |e: mupdf::error::Error| CompressError::render(page_index, e);

            let page = self.doc.load_page(page_index as i32).map_err(render_err)?;
            let bounds = page.bounds().map_err(render_err)?;
            surface_size(
                page_index,
                bounds.x1 - bounds.x0,
                bounds.y1 - bounds.y0,
                scale,
            )?;

            let pixmap = page
                .to_pixmap(&Matrix::new_scale(scale, scale), &Colorspace::device_rgb(), false, false)
                .map_err(render_err)?;

            let pixels = pixmap_to_rgb(&pixmap)
                .map_err(|cause| CompressError::render(page_index, cause))?;

            Ok(PageSurface {
                width_px: pixmap.width(),
                height_px: pixmap.height(),
                pixels,
            })
        }
    }

    /// Copy the pixmap into a packed RGB buffer, dropping row padding and any
    /// extra channels
    fn pixmap_to_rgb(pixmap: &Pixmap) -> Result<Vec<u8>, String> {
        let n = pixmap.n() as usize;
        if n < 3 {
            return Err(format!("unsupported pixmap format: {n} channels"));
        }

        let width = pixmap.width() as usize;
        let height = pixmap.height() as usize;
        let stride = pixmap.stride() as usize;
        let samples = pixmap.samples();
        let row_bytes = width * n;
        if samples.len() < stride.saturating_mul(height) || row_bytes > stride {
            return Err("pixmap buffer size mismatch".to_string());
        }

        let mut out = Vec::with_capacity(width * height * 3);
        for row in samples.chunks(stride).take(height) {
            let row = &row[..row_bytes];
            if n == 3 {
                out.extend_from_slice(row);
            } else {
                for px in row.chunks_exact(n) {
                    out.extend_from_slice(&px[..3]);
                }
            }
        }

        Ok(out)
    }
}


#[cfg(all(test, feature = "pdf"))]
mod mupdf_tests {
    use super::*;
    use crate::test_utils::text_pdf;

    #[test]
    fn renders_text_page_on_white() {
        let doc = MupdfLoader.open(&text_pdf(1)).unwrap();
        assert_eq!(doc.page_count(), 1);

        let surface = doc.render_page(0, 0.5).unwrap();
        assert_eq!(surface.width_px, 306);
        assert_eq!(surface.height_px, 396);
        assert_eq!(surface.pixels.len(), surface.expected_len());
        assert_eq!(&surface.pixels[..3], &[0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn garbage_is_corrupt() {
        let err = MupdfLoader.open(b"definitely not a pdf").err().unwrap();
        assert!(matches!(err, CompressError::CorruptDocument { .. }));
    }

    #[test]
    fn empty_input_is_corrupt() {
        let err = MupdfLoader.open(&[]).err().unwrap();
        assert!(matches!(err, CompressError::CorruptDocument { .. }));
    }

    #[test]
    fn out_of_range_page_is_a_render_error() {
        let doc = MupdfLoader.open(&text_pdf(2)).unwrap();
        let err = doc.render_page(5, 1.0).unwrap_err();
        assert!(matches!(err, CompressError::Render { page_index: 5, .. }));
    }
}
