//! PDF backend for chatexport.
//!
//! [`PdfRenderer`] decodes a document's images, lays the document out with
//! exact Helvetica metrics and writes the result with `lopdf`. [`info`] and
//! [`page_texts`] read a file back.

use chatexport_core::layout::{
    layout_document, Font, ImagePlacementError, LayoutBackend, LayoutConfig, LayoutError,
};
use chatexport_core::model::{Document, ImageRef};
use thiserror::Error;

pub mod images;
pub mod metrics;
pub mod reader;
pub mod writer;

pub use images::ImageCatalog;
pub use reader::{info, page_texts, PdfInfo};

#[derive(Debug, Error)]
pub enum PdfError {
    #[error("Layout error: {0}")]
    Layout(#[from] LayoutError),
    #[error("Image error: {0}")]
    Image(#[from] ImagePlacementError),
    #[error("PDF write error: {0}")]
    Write(String),
    #[error("PDF parsing error: {0}")]
    Parse(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Standard-font metrics plus the images that could be decoded.
pub struct PdfMetrics<'a> {
    catalog: &'a ImageCatalog,
}

impl<'a> PdfMetrics<'a> {
    pub fn new(catalog: &'a ImageCatalog) -> Self {
        PdfMetrics { catalog }
    }
}

impl LayoutBackend for PdfMetrics<'_> {
    fn text_width(&self, text: &str, font: Font, size: f32) -> f32 {
        metrics::text_width(text, font, size)
    }

    fn check_image(&self, image: &ImageRef) -> Result<(), ImagePlacementError> {
        self.catalog.check(image)
    }
}

/// Renders documents to PDF bytes with one layout configuration.
#[derive(Debug, Clone, Default)]
pub struct PdfRenderer {
    config: LayoutConfig,
}

impl PdfRenderer {
    pub fn new(config: LayoutConfig) -> Self {
        PdfRenderer { config }
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    pub fn render(&self, doc: &Document) -> Result<Vec<u8>, PdfError> {
        let catalog = ImageCatalog::from_document(doc);
        log::debug!("{} image(s) decoded for embedding", catalog.embedded());

        let layout = layout_document(doc, &self.config, &PdfMetrics::new(&catalog))?;
        log::debug!("writing {} page(s)", layout.page_count());

        let meta = writer::Metadata {
            title: &doc.title,
            created: doc.date,
        };
        writer::PageWriter::new(&self.config, &catalog).write(&layout, &meta)
    }

    /// Render `doc` and write the file to `path`.
    pub fn render_to_file(
        &self,
        doc: &Document,
        path: impl AsRef<std::path::Path>,
    ) -> Result<(), PdfError> {
        let bytes = self.render(doc)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::tests::{png_data_uri, svg_data_uri};
    use chatexport_core::layout::IMAGE_FALLBACK_TEXT;
    use chatexport_core::model::{CodeBlock, CodeBlockId, ImageKind, Message, Role};
    use chrono::{TimeZone, Utc};

    fn message(role: Role, text: &str) -> Message {
        Message {
            role,
            text: text.to_string(),
            code_blocks: vec![],
            images: vec![],
        }
    }

    fn document(messages: Vec<Message>) -> Document {
        Document::new(
            "Test chat",
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            messages,
        )
    }

    fn image(source: String, kind: ImageKind) -> ImageRef {
        ImageRef {
            kind,
            source,
            width: None,
            height: None,
        }
    }

    fn all_text(bytes: &[u8]) -> Vec<String> {
        page_texts(bytes).unwrap().into_iter().flatten().collect()
    }

    // -- render -------------------------------------------------------------

    #[test]
    fn single_message_is_one_page() {
        let doc = document(vec![message(Role::User, "Hello there")]);
        let bytes = PdfRenderer::default().render(&doc).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));

        let info = info(&bytes).unwrap();
        assert_eq!(info.page_count, 1);
        assert_eq!(info.title.as_deref(), Some("Test chat"));
        assert_eq!(info.creator.as_deref(), Some("chatexport"));
        assert_eq!(info.creation_date.as_deref(), Some("D:20240501120000Z"));

        let text = all_text(&bytes);
        assert_eq!(text[0], "Test chat");
        assert!(text.contains(&"Hello there".to_string()));
    }

    #[test]
    fn unicode_title_round_trips() {
        let mut doc = document(vec![message(Role::User, "hi")]);
        doc.title = "Résumé 日本".to_string();
        let bytes = PdfRenderer::default().render(&doc).unwrap();
        assert_eq!(info(&bytes).unwrap().title.as_deref(), Some("Résumé 日本"));
        // The drawn title goes through WinAnsi.
        assert_eq!(all_text(&bytes)[0], "Résumé ??");
    }

    #[test]
    fn long_conversation_spans_pages() {
        let messages = (0..60)
            .map(|i| message(Role::Assistant, &format!("Message number {}\nsecond line", i)))
            .collect();
        let bytes = PdfRenderer::default().render(&document(messages)).unwrap();
        let pages = page_texts(&bytes).unwrap();
        assert!(pages.len() > 1);
        assert_eq!(info(&bytes).unwrap().page_count, pages.len());
        assert!(pages.last().unwrap().contains(&"Message number 59".to_string()));
    }

    #[test]
    fn code_blocks_are_labelled() {
        let mut m = message(Role::Assistant, "Run this:\n[[CODE_BLOCK:code-0]]");
        m.code_blocks.push(CodeBlock {
            id: CodeBlockId::new(0),
            language: "bash".to_string(),
            code: "echo hi".to_string(),
        });
        let text = all_text(&PdfRenderer::default().render(&document(vec![m])).unwrap());
        let label = text.iter().position(|t| t == "bash").unwrap();
        assert_eq!(text[label + 1], "echo hi");
    }

    #[test]
    fn raster_image_is_embedded() {
        let mut m = message(Role::Assistant, "Chart:");
        m.images.push(image(png_data_uri(4, 2, [0, 128, 255, 255]), ImageKind::Raster));
        let bytes = PdfRenderer::default().render(&document(vec![m])).unwrap();

        assert!(!all_text(&bytes).contains(&IMAGE_FALLBACK_TEXT.to_string()));
        assert_eq!(image_xobjects(&bytes), 1);
    }

    fn image_xobjects(bytes: &[u8]) -> usize {
        let doc = lopdf::Document::load_mem(bytes).unwrap();
        doc.objects
            .values()
            .filter(|obj| match obj {
                lopdf::Object::Stream(s) => s
                    .dict
                    .get(b"Subtype")
                    .and_then(|v| v.as_name())
                    .map(|n| n == b"Image")
                    .unwrap_or(false),
                _ => false,
            })
            .count()
    }

    #[test]
    fn vector_image_is_embedded() {
        let mut m = message(Role::Assistant, "Diagram:");
        m.images.push(image(
            svg_data_uri(
                r##"<svg xmlns="http://www.w3.org/2000/svg" width="120" height="60"><circle cx="30" cy="30" r="20" fill="#336699"/></svg>"##,
            ),
            ImageKind::Vector,
        ));
        let bytes = PdfRenderer::default().render(&document(vec![m])).unwrap();

        assert!(!all_text(&bytes).contains(&IMAGE_FALLBACK_TEXT.to_string()));
        assert_eq!(image_xobjects(&bytes), 1);
    }

    #[test]
    fn unembeddable_images_fall_back_to_text() {
        let mut m = message(Role::Assistant, "Pictures:");
        m.images.push(image(
            "https://example.com/remote.png".to_string(),
            ImageKind::Raster,
        ));
        m.images.push(image(svg_data_uri("<svg"), ImageKind::Vector));
        let text = all_text(&PdfRenderer::default().render(&document(vec![m])).unwrap());
        assert_eq!(
            text.iter().filter(|t| *t == IMAGE_FALLBACK_TEXT).count(),
            2
        );
    }

    #[test]
    fn invalid_config_is_a_layout_error() {
        let config = LayoutConfig {
            bubble_width: 10_000.0,
            ..LayoutConfig::default()
        };
        let result = PdfRenderer::new(config).render(&document(vec![message(Role::User, "x")]));
        assert!(matches!(result, Err(PdfError::Layout(_))));
    }

    #[test]
    fn metrics_follow_font_widths() {
        let catalog = ImageCatalog::default();
        let backend = PdfMetrics::new(&catalog);
        assert!(
            backend.text_width("WWW", Font::Helvetica, 10.0)
                > backend.text_width("iii", Font::Helvetica, 10.0)
        );
        let missing = image("data:image/png;base64,AAAA".to_string(), ImageKind::Raster);
        assert!(matches!(
            backend.check_image(&missing),
            Err(ImagePlacementError::NotEmbedded(_))
        ));
    }

    #[test]
    fn render_to_file_writes_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.pdf");
        PdfRenderer::default()
            .render_to_file(&document(vec![message(Role::User, "saved")]), &path)
            .unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(info(&bytes).unwrap().page_count, 1);
    }
}
