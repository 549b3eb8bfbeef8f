//! Document reading: raw bytes to ordered text lines.

mod extractor;

pub use extractor::PdfExtractor;

use std::path::Path;

use serde::Serialize;

use crate::error::PdfError;

/// Result type for document reading.
pub type Result<T> = std::result::Result<T, PdfError>;

/// One line of extracted text with layout hints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextLine {
    /// 1-based position in the document.
    pub number: usize,
    /// Trimmed text.
    pub text: String,
    /// Width of the leading whitespace before trimming.
    pub indent: usize,
    /// Segments separated by runs of two or more spaces or tabs.
    pub columns: Vec<String>,
}

impl TextLine {
    pub fn new(number: usize, raw: &str) -> Self {
        let trimmed_start = raw.trim_start();
        let indent = raw.chars().count() - trimmed_start.chars().count();
        let text = trimmed_start.trim_end().to_string();

        Self {
            number,
            columns: split_columns(&text),
            text,
            indent,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.text.is_empty()
    }
}

fn split_columns(text: &str) -> Vec<String> {
    let mut columns = Vec::new();
    let mut current = String::new();
    let mut spaces = 0usize;

    for c in text.chars() {
        if c == '\t' {
            spaces = 2;
            continue;
        }
        if c == ' ' {
            spaces += 1;
            continue;
        }
        if spaces >= 2 && !current.is_empty() {
            columns.push(std::mem::take(&mut current));
        } else if spaces == 1 && !current.is_empty() {
            current.push(' ');
        }
        spaces = 0;
        current.push(c);
    }
    if !current.is_empty() {
        columns.push(current);
    }
    columns
}

/// Text content of a whole document.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractedDocument {
    /// Number of pages in the source (1 for text dumps).
    pub page_count: u32,
    /// Non-blank lines in reading order.
    pub lines: Vec<TextLine>,
}

impl ExtractedDocument {
    /// Split extracted text into numbered lines, dropping blank ones.
    pub fn from_text(text: &str, page_count: u32) -> Self {
        let lines = text
            .lines()
            .enumerate()
            .map(|(i, raw)| TextLine::new(i + 1, raw))
            .filter(|line| !line.is_blank())
            .collect();

        Self { page_count, lines }
    }

    /// The lines joined back into plain text.
    pub fn text(&self) -> String {
        self.lines
            .iter()
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// The lines at their original numbers and indents. [`from_text`](Self::from_text)
    /// on the result gives back the same lines.
    pub fn layout_text(&self) -> String {
        let mut text = String::new();
        let mut next = 1;
        for line in &self.lines {
            while next < line.number {
                text.push('\n');
                next += 1;
            }
            text.push_str(&" ".repeat(line.indent));
            text.push_str(&line.text);
            text.push('\n');
            next += 1;
        }
        text
    }
}

/// Trait for document readers.
pub trait DocumentReader: Send + Sync {
    /// Extract text lines from raw document bytes.
    fn read(&self, data: &[u8]) -> Result<ExtractedDocument>;

    /// Read a file from disk and extract its lines.
    fn read_path(&self, path: &Path) -> Result<ExtractedDocument> {
        let data = std::fs::read(path)?;
        self.read(&data)
    }
}

/// Reader for plain UTF-8 text dumps of documents (e.g. `pdftotext -layout` output).
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextReader;

impl DocumentReader for PlainTextReader {
    fn read(&self, data: &[u8]) -> Result<ExtractedDocument> {
        let text = std::str::from_utf8(data)
            .map_err(|e| PdfError::TextExtraction(format!("not UTF-8 text: {}", e)))?;

        let doc = ExtractedDocument::from_text(text, 1);
        if doc.lines.is_empty() {
            return Err(PdfError::NoText);
        }
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_text_line_layout_hints() {
        let line = TextLine::new(3, "    2 LEFFE BLOND    1,11   2,22 B  ");

        assert_eq!(line.number, 3);
        assert_eq!(line.indent, 4);
        assert_eq!(line.text, "2 LEFFE BLOND    1,11   2,22 B");
        assert_eq!(line.columns, vec!["2 LEFFE BLOND", "1,11", "2,22 B"]);
    }

    #[test]
    fn test_from_text_drops_blank_lines_keeps_numbers() {
        let doc = ExtractedDocument::from_text("AH\n\n  \n1 MELK 1,09\n", 1);

        assert_eq!(doc.lines.len(), 2);
        assert_eq!(doc.lines[1].number, 4);
        assert_eq!(doc.text(), "AH\n1 MELK 1,09");
    }

    #[test]
    fn test_layout_text_keeps_numbers_and_indent() {
        let doc = ExtractedDocument::from_text("AH\n\n  \n    1 MELK    1,09\nTOTAAL 1,09", 1);
        let stored = doc.layout_text();

        assert_eq!(stored, "AH\n\n\n    1 MELK    1,09\nTOTAAL 1,09\n");
        assert_eq!(ExtractedDocument::from_text(&stored, 1).lines, doc.lines);
    }

    #[test]
    fn test_plain_text_reader_rejects_empty() {
        assert!(matches!(PlainTextReader.read(b"  \n\n"), Err(PdfError::NoText)));
        assert!(matches!(
            PlainTextReader.read(&[0xff, 0xfe, 0x00]),
            Err(PdfError::TextExtraction(_))
        ));
    }

    #[test]
    fn test_read_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bon.txt");
        std::fs::write(&path, "ALBERT HEIJN\nMelk 1 1.09 1.09\n").unwrap();

        let doc = PlainTextReader.read_path(&path).unwrap();
        assert_eq!(doc.lines.len(), 2);

        let missing = dir.path().join("missing.txt");
        assert!(matches!(PlainTextReader.read_path(&missing), Err(PdfError::Io(_))));
    }
}
