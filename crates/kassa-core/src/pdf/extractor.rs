//! PDF text extraction using lopdf and pdf-extract.

use lopdf::Document;
use tracing::{debug, trace};

use super::{DocumentReader, ExtractedDocument, Result};
use crate::error::PdfError;

/// PDF reader: lopdf validates structure and handles encryption,
/// pdf-extract produces the text.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfExtractor;

/// A loaded PDF ready for text extraction.
struct LoadedPdf {
    /// Bytes pdf-extract should read (decrypted if needed).
    data: Vec<u8>,
    page_count: u32,
}

impl PdfExtractor {
    pub fn new() -> Self {
        Self
    }

    fn load(&self, data: &[u8]) -> Result<LoadedPdf> {
        let mut doc = Document::load_mem(data).map_err(|e| PdfError::Parse(e.to_string()))?;

        // Handle PDFs with empty password encryption
        let data = if doc.is_encrypted() {
            if doc.decrypt("").is_err() {
                return Err(PdfError::Encrypted);
            }
            debug!("Decrypted PDF with empty password");

            let mut decrypted = Vec::new();
            doc.save_to(&mut decrypted)
                .map_err(|e| PdfError::Parse(format!("failed to save decrypted PDF: {}", e)))?;
            decrypted
        } else {
            data.to_vec()
        };

        let page_count = doc.get_pages().len() as u32;
        if page_count == 0 {
            return Err(PdfError::NoPages);
        }

        debug!("Loaded PDF with {} pages", page_count);
        Ok(LoadedPdf { data, page_count })
    }
}

impl DocumentReader for PdfExtractor {
    fn read(&self, data: &[u8]) -> Result<ExtractedDocument> {
        let pdf = self.load(data)?;

        let text = pdf_extract::extract_text_from_mem(&pdf.data)
            .map_err(|e| PdfError::TextExtraction(e.to_string()))?;

        let doc = ExtractedDocument::from_text(&text, pdf.page_count);
        if doc.lines.is_empty() {
            // Scanned receipts carry only images; there is no OCR fallback.
            return Err(PdfError::NoText);
        }

        trace!(
            "Extracted {} lines from {} pages",
            doc.lines.len(),
            doc.page_count
        );
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Object, Stream};

    fn build_pdf(lines: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });

        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![50.into(), 750.into()]),
            Operation::new("TL", vec![14.into()]),
        ];
        for line in lines {
            operations.push(Operation::new("Tj", vec![Object::string_literal(*line)]));
            operations.push(Operation::new("T*", vec![]));
        }
        operations.push(Operation::new("ET", vec![]));

        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn test_rejects_non_pdf_bytes() {
        let result = PdfExtractor::new().read(b"this is not a pdf");
        assert!(matches!(result, Err(PdfError::Parse(_))));
    }

    #[test]
    fn test_reads_generated_pdf() {
        let bytes = build_pdf(&["AH Kassabon", "1 MELK 1,09"]);

        let doc = PdfExtractor::new().read(&bytes).unwrap();

        assert_eq!(doc.page_count, 1);
        assert!(doc.text().contains("MELK"));
    }
}
