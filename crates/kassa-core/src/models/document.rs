//! Source documents (receipts and invoices) and their identity.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Kind of source document. Selects the line-item layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// Online order invoice (factuur).
    Invoice,
    /// In-store receipt (kassabon).
    Receipt,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Invoice => "invoice",
            DocumentKind::Receipt => "receipt",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "invoice" | "factuur" => Ok(DocumentKind::Invoice),
            "receipt" | "kassabon" | "bon" => Ok(DocumentKind::Receipt),
            other => Err(format!("unknown document kind: {}", other)),
        }
    }
}

/// SHA-256 fingerprint of a document's bytes, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// Hash raw document bytes.
    pub fn of(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Wrap an already computed hex digest (e.g. read back from the store).
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, for display.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Header fields read from the top and bottom of a document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentHeader {
    /// Receipt number (`BON-1177`) or invoice number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_number: Option<String>,

    /// Date of purchase, applied to every line item.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase_date: Option<NaiveDate>,

    /// Total amount stated on the document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<Decimal>,

    /// Savings stated on the document ("UW VOORDEEL").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub savings: Option<Decimal>,
}

/// A document discovered on disk. Immutable once imported.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDocument {
    pub path: PathBuf,
    pub kind: DocumentKind,
    pub hash: ContentHash,
    pub discovered_at: DateTime<Utc>,
    pub header: DocumentHeader,
    /// Version of the rule table used to categorize the records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules_version: Option<u32>,
    /// Extracted text at its original line numbers, so the document can be
    /// parsed again without the file.
    #[serde(skip)]
    pub raw_text: String,
}

impl SourceDocument {
    /// Create a document from its path and bytes.
    pub fn new(path: impl AsRef<Path>, kind: DocumentKind, data: &[u8]) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            kind,
            hash: ContentHash::of(data),
            discovered_at: Utc::now(),
            header: DocumentHeader::default(),
            rules_version: None,
            raw_text: String::new(),
        }
    }

    pub fn with_header(mut self, header: DocumentHeader) -> Self {
        self.header = header;
        self
    }

    pub fn with_raw_text(mut self, text: impl Into<String>) -> Self {
        self.raw_text = text.into();
        self
    }

    pub fn with_rules_version(mut self, version: u32) -> Self {
        self.rules_version = Some(version);
        self
    }

    /// File name for display.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// A document as read back from the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredDocument {
    pub id: i64,
    pub hash: ContentHash,
    pub path: String,
    pub kind: DocumentKind,
    pub header: DocumentHeader,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules_version: Option<u32>,
    pub imported_at: DateTime<Utc>,
    pub record_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_ignores_name() {
        let a = SourceDocument::new("a.pdf", DocumentKind::Receipt, b"same bytes");
        let b = SourceDocument::new("b.pdf", DocumentKind::Receipt, b"same bytes");
        let c = SourceDocument::new("a.pdf", DocumentKind::Receipt, b"other bytes");

        assert_eq!(a.hash, b.hash);
        assert_ne!(a.hash, c.hash);
        assert_eq!(a.hash.as_str().len(), 64);
        assert_eq!(a.hash.short().len(), 12);
    }

    #[test]
    fn test_document_kind_parsing() {
        assert_eq!("invoice".parse::<DocumentKind>(), Ok(DocumentKind::Invoice));
        assert_eq!("Kassabon".parse::<DocumentKind>(), Ok(DocumentKind::Receipt));
        assert!("statement".parse::<DocumentKind>().is_err());
    }
}
