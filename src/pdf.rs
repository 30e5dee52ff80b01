//! PDF text and embedded-image extraction.

use lopdf::Document;

/// Errors surfaced while reading an uploaded PDF.
#[derive(Debug, thiserror::Error)]
pub enum PdfError {
    /// The bytes are not a readable PDF.
    #[error("unreadable or non-PDF input: {0}")]
    Unreadable(String),
}

/// Text extracted from one page.
#[derive(Debug, Clone)]
pub struct PageText {
    /// 1-based page number.
    pub page: u32,
    /// Extracted text, trimmed.
    pub text: String,
}

/// One embedded raster image.
#[derive(Debug, Clone)]
pub struct PageImage {
    /// 1-based page number the image appears on.
    pub page: u32,
    /// Self-contained image payload.
    pub data: Vec<u8>,
    /// Media type of the payload.
    pub mime: &'static str,
}

/// Ordered extraction output for one document.
#[derive(Debug, Clone, Default)]
pub struct ExtractedDocument {
    /// Total page count.
    pub pages: u32,
    /// Per-page text, pages without extractable text omitted.
    pub text: Vec<PageText>,
    /// Embedded images in page order.
    pub images: Vec<PageImage>,
}

/// Extracts per-page text and embedded images from raw PDF bytes.
///
/// A page with no extractable text or no images contributes zero items to the
/// respective sequence; only an unreadable document fails the call. Images are
/// forwarded only when their stream is a self-contained payload (JPEG via
/// DCTDecode); other encodings would need re-rasterization and are skipped.
pub fn extract(bytes: &[u8]) -> Result<ExtractedDocument, PdfError> {
    let doc = Document::load_mem(bytes).map_err(|err| PdfError::Unreadable(err.to_string()))?;
    let pages = doc.get_pages();
    let mut out = ExtractedDocument {
        pages: pages.len() as u32,
        ..Default::default()
    };

    for (&page_no, &page_id) in &pages {
        match doc.extract_text(&[page_no]) {
            Ok(text) => {
                let text = text.trim().to_string();
                if !text.is_empty() {
                    out.text.push(PageText { page: page_no, text });
                }
            }
            Err(err) => {
                tracing::debug!(page = page_no, error = %err, "no extractable text on page");
            }
        }

        match doc.get_page_images(page_id) {
            Ok(images) => {
                for image in images {
                    let filters = image.filters.clone().unwrap_or_default();
                    if filters.iter().any(|filter| filter == "DCTDecode") {
                        out.images.push(PageImage {
                            page: page_no,
                            data: image.content.to_vec(),
                            mime: "image/jpeg",
                        });
                    } else {
                        tracing::debug!(
                            page = page_no,
                            ?filters,
                            "skipping image without self-contained encoding"
                        );
                    }
                }
            }
            Err(err) => {
                tracing::debug!(page = page_no, error = %err, "no images on page");
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Object, Stream};

    fn pdf_with_text(lines: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let mut kids = Vec::new();
        for line in lines {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 24.into()]),
                    Operation::new("Td", vec![100.into(), 600.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*line)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().expect("encode")));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }
        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        let mut buf = Vec::new();
        doc.save_to(&mut buf).expect("save");
        buf
    }

    #[test]
    fn extracts_text_per_page() {
        let bytes = pdf_with_text(&["invoice total is 42 dollars", "second page body"]);
        let extracted = extract(&bytes).expect("extract");
        assert_eq!(extracted.pages, 2);
        assert_eq!(extracted.text.len(), 2);
        assert_eq!(extracted.text[0].page, 1);
        assert!(extracted.text[0].text.contains("invoice total"));
        assert_eq!(extracted.text[1].page, 2);
        assert!(extracted.images.is_empty());
    }

    #[test]
    fn rejects_non_pdf_bytes() {
        let err = extract(b"definitely not a pdf").unwrap_err();
        assert!(matches!(err, PdfError::Unreadable(_)));
    }

    #[test]
    fn tolerates_pages_without_text() {
        let bytes = pdf_with_text(&[""]);
        let extracted = extract(&bytes).expect("extract");
        assert_eq!(extracted.pages, 1);
        assert!(extracted.text.is_empty());
    }
}
