//! Builds a fresh PDF out of JPEG page images
//!
//! Every output page is exactly as large as its image (one pixel per point)
//! and carries nothing but that image.

use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};

use super::request::CompressError;
use super::types::EncodedPage;

const PDF_VERSION: &str = "1.5";
const IMAGE_NAME: &str = "Im0";

/// Info dictionary keys that are always written out empty
pub const STRIPPED_METADATA: [&str; 6] = [
    "Title", "Author", "Subject", "Keywords", "Creator", "Producer",
];

/// Incremental writer: pages are embedded one by one, the page tree is
/// closed in [`PdfAssembler::finish`].
pub struct PdfAssembler {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
    last_index: Option<usize>,
}

impl PdfAssembler {
    #[must_use]
    pub fn new() -> Self {
        let mut doc = Document::with_version(PDF_VERSION);
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            kids: Vec::new(),
            last_index: None,
        }
    }

    /// Number of pages embedded so far
    #[must_use]
    pub fn page_count(&self) -> usize {
        self.kids.len()
    }

    /// Append one page holding `page` drawn full-bleed.
    ///
    /// Pages must arrive in source order. The JPEG bytes move into the
    /// image stream.
    pub fn add_page(&mut self, page: EncodedPage) -> Result<(), CompressError> {
        let EncodedPage {
            page_index,
            bytes,
            width_px,
            height_px,
        } = page;

        if let Some(last) = self.last_index {
            if page_index <= last {
                return Err(CompressError::reassembly(format!(
                    "page index {page_index} arrived after page index {last}"
                )));
            }
        }
        if width_px == 0 || height_px == 0 || bytes.is_empty() {
            return Err(CompressError::reassembly(format!(
                "page index {page_index} has no image data"
            )));
        }

        let width = i64::from(width_px);
        let height = i64::from(height_px);

        let image = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width,
                "Height" => height,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            bytes,
        )
        .with_compression(false);
        let image_id = self.doc.add_object(image);

        let content = format!("q\n{width} 0 0 {height} 0 0 cm\n/{IMAGE_NAME} Do\nQ\n");
        let content_id = self
            .doc
            .add_object(Stream::new(Dictionary::new(), content.into_bytes()));

        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { IMAGE_NAME => image_id },
            },
        });

        self.kids.push(page_id.into());
        self.last_index = Some(page_index);
        Ok(())
    }

    /// Close the page tree, blank the metadata and serialize
    pub fn finish(mut self) -> Result<Vec<u8>, CompressError> {
        if self.kids.is_empty() {
            return Err(CompressError::reassembly(
                "a PDF needs at least one page, none were produced",
            ));
        }

        let count = self.kids.len() as i64;
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => self.kids,
            "Count" => count,
        };
        self.doc.objects.insert(self.pages_id, Object::Dictionary(pages));

        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);

        let mut info = Dictionary::new();
        for key in STRIPPED_METADATA {
            info.set(key, Object::string_literal(""));
        }
        let info_id = self.doc.add_object(info);
        self.doc.trailer.set("Info", info_id);

        self.doc.compress();

        let mut out = Vec::new();
        self.doc
            .save_to(&mut out)
            .map_err(|e| CompressError::reassembly(format!("failed to serialize PDF: {e}")))?;
        Ok(out)
    }
}

impl Default for PdfAssembler {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a PDF from already ordered pages in one go
pub fn build_pdf(
    pages: impl IntoIterator<Item = EncodedPage>,
) -> Result<Vec<u8>, CompressError> {
    let mut assembler = PdfAssembler::new();
    for page in pages {
        assembler.add_page(page)?;
    }
    assembler.finish()
}
