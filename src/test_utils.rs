//! Fixtures shared by unit and integration tests

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use lopdf::{Dictionary, Document, Object, Stream, dictionary};

use crate::pdf::{CompressError, DocumentLoader, PageDocument, PageSurface, surface_size};

/// US Letter, in points
pub const LETTER: (f32, f32) = (612.0, 792.0);

/// A PDF with `pages` pages of Helvetica text and no metadata
#[must_use]
pub fn text_pdf(pages: usize) -> Vec<u8> {
    build_text_pdf(pages, None)
}

/// Like [`text_pdf`], with a fully populated Info dictionary
#[must_use]
pub fn text_pdf_with_metadata(pages: usize) -> Vec<u8> {
    let info = dictionary! {
        "Title" => Object::string_literal("Quarterly report"),
        "Author" => Object::string_literal("Jane Doe"),
        "Subject" => Object::string_literal("Numbers"),
        "Keywords" => Object::string_literal("finance, q3"),
        "Creator" => Object::string_literal("Writer"),
        "Producer" => Object::string_literal("Some PDF library 1.0"),
    };
    build_text_pdf(pages, Some(info))
}

fn build_text_pdf(pages: usize, info: Option<Dictionary>) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let (width, height) = LETTER;
    let mut kids: Vec<Object> = Vec::with_capacity(pages);
    for n in 1..=pages {
        let content = format!(
            "BT /F1 36 Tf 72 700 Td (Page {n}) Tj ET\n\
             BT /F1 12 Tf 72 650 Td (The quick brown fox jumps over the lazy dog.) Tj ET\n"
        );
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(page_id.into());
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    if let Some(info) = info {
        let info_id = doc.add_object(info);
        doc.trailer.set("Info", info_id);
    }

    let mut out = Vec::new();
    doc.save_to(&mut out).expect("writing a PDF to memory");
    out
}

/// In-memory [`DocumentLoader`] with scripted page failures.
///
/// Pages are plain gray surfaces; no PDF parsing happens.
#[derive(Clone, Debug)]
pub struct ScriptedLoader {
    pages: usize,
    page_size: (f32, f32),
    corrupt: bool,
    render_failures: BTreeSet<usize>,
    encode_failures: BTreeSet<usize>,
    page_delay: Option<Duration>,
    rendered: Arc<AtomicUsize>,
}

impl ScriptedLoader {
    #[must_use]
    pub fn new(pages: usize) -> Self {
        Self {
            pages,
            page_size: (200.0, 100.0),
            corrupt: false,
            render_failures: BTreeSet::new(),
            encode_failures: BTreeSet::new(),
            page_delay: None,
            rendered: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Loader whose `open` always fails
    #[must_use]
    pub fn corrupt() -> Self {
        Self {
            corrupt: true,
            ..Self::new(0)
        }
    }

    /// Make `page_index` fail to render
    #[must_use]
    pub fn fail_render(mut self, page_index: usize) -> Self {
        self.render_failures.insert(page_index);
        self
    }

    /// Make `page_index` render into a surface the encoder rejects
    #[must_use]
    pub fn fail_encode(mut self, page_index: usize) -> Self {
        self.encode_failures.insert(page_index);
        self
    }

    #[must_use]
    pub fn with_page_size(mut self, width_pt: f32, height_pt: f32) -> Self {
        self.page_size = (width_pt, height_pt);
        self
    }

    /// Sleep this long in every `render_page` call
    #[must_use]
    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = Some(delay);
        self
    }

    /// Pages rendered so far, across every document this loader opened
    #[must_use]
    pub fn rendered(&self) -> usize {
        self.rendered.load(Ordering::SeqCst)
    }

    /// Shared counter behind [`ScriptedLoader::rendered`]
    #[must_use]
    pub fn render_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.rendered)
    }
}

impl DocumentLoader for ScriptedLoader {
    fn open(&self, bytes: &[u8]) -> Result<Box<dyn PageDocument>, CompressError> {
        if self.corrupt {
            return Err(CompressError::corrupt(format!(
                "scripted failure for {} byte input",
                bytes.len()
            )));
        }
        if self.pages == 0 {
            return Err(CompressError::corrupt("document has no pages"));
        }
        Ok(Box::new(ScriptedDocument {
            script: self.clone(),
        }))
    }
}

struct ScriptedDocument {
    script: ScriptedLoader,
}

impl PageDocument for ScriptedDocument {
    fn page_count(&self) -> usize {
        self.script.pages
    }

    fn render_page(&self, page_index: usize, scale: f32) -> Result<PageSurface, CompressError> {
        if let Some(delay) = self.script.page_delay {
            std::thread::sleep(delay);
        }
        self.script.rendered.fetch_add(1, Ordering::SeqCst);

        if page_index >= self.script.pages {
            return Err(CompressError::render(page_index, "page out of range"));
        }
        if self.script.render_failures.contains(&page_index) {
            return Err(CompressError::render(page_index, "scripted render failure"));
        }

        let (width_pt, height_pt) = self.script.page_size;
        let (width_px, height_px) = surface_size(page_index, width_pt, height_pt, scale)?;
        let mut surface = PageSurface::blank(width_px, height_px);
        let shade = (page_index % 200) as u8;
        for px in surface.pixels.chunks_exact_mut(3) {
            px.copy_from_slice(&[shade, 128, 255 - shade]);
        }
        if self.script.encode_failures.contains(&page_index) {
            surface.pixels.truncate(surface.pixels.len() / 2);
        }
        Ok(surface)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_pdf_has_requested_pages() {
        let doc = Document::load_mem(&text_pdf(3)).unwrap();
        assert_eq!(doc.get_pages().len(), 3);
    }

    #[test]
    fn scripted_loader_counts_renders() {
        let loader = ScriptedLoader::new(2).fail_render(1);
        let doc = loader.open(b"x").unwrap();
        assert!(doc.render_page(0, 1.0).is_ok());
        assert!(doc.render_page(1, 1.0).is_err());
        assert_eq!(loader.rendered(), 2);
    }

    #[test]
    fn scripted_encode_failure_has_short_buffer() {
        let loader = ScriptedLoader::new(1).fail_encode(0);
        let surface = loader.open(b"x").unwrap().render_page(0, 1.0).unwrap();
        assert!(surface.pixels.len() < surface.expected_len());
    }
}
