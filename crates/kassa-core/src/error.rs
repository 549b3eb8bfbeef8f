//! Error types for the kassa-core library.

use std::fmt;

use thiserror::Error;

/// Main error type for the kassa library.
#[derive(Error, Debug)]
pub enum KassaError {
    /// The document could not be read as a PDF.
    #[error("unreadable document: {0}")]
    Pdf(#[from] PdfError),

    /// A document-level field could not be extracted.
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// Persisting or querying the store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The category rule table is invalid or could not be loaded.
    #[error("rule table error: {0}")]
    Rules(#[from] RuleError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors raised while reading a document (the file is unusable as a whole).
#[derive(Error, Debug)]
pub enum PdfError {
    /// Failed to open/parse the PDF file.
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    /// Failed to extract text from PDF.
    #[error("failed to extract text: {0}")]
    TextExtraction(String),

    /// The PDF is encrypted with a non-empty password.
    #[error("PDF is encrypted")]
    Encrypted,

    /// The PDF is empty or has no pages.
    #[error("PDF has no pages")]
    NoPages,

    /// The document contains no extractable text.
    #[error("document contains no text")]
    NoText,

    /// The file could not be read from disk.
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),
}

/// Document-level extraction failures (fatal for the file).
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// Required field is missing.
    #[error("missing required field: {0}")]
    MissingField(String),

    /// Failed to parse a value.
    #[error("failed to parse {field}: {value}")]
    Parse { field: String, value: String },
}

/// Why a single line could not be turned into a purchase record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorReason {
    /// The line carries amounts but matches no known item layout.
    UnrecognizedLayout,
    /// An amount or quantity on the line is not a number.
    InvalidNumber(String),
    /// `quantity × unit price` does not reproduce the line total.
    TotalMismatch {
        expected: rust_decimal::Decimal,
        actual: rust_decimal::Decimal,
    },
    /// `excl + vat` does not reproduce the amount including VAT.
    VatMismatch {
        expected: rust_decimal::Decimal,
        actual: rust_decimal::Decimal,
    },
    /// A zero or negative quantity.
    InvalidQuantity(String),
}

impl fmt::Display for ParseErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnrecognizedLayout => write!(f, "unrecognized line layout"),
            Self::InvalidNumber(value) => write!(f, "invalid number '{}'", value),
            Self::TotalMismatch { expected, actual } => {
                write!(f, "quantity x unit price = {} but line total is {}", expected, actual)
            }
            Self::VatMismatch { expected, actual } => {
                write!(f, "excl + vat = {} but incl is {}", expected, actual)
            }
            Self::InvalidQuantity(value) => write!(f, "invalid quantity '{}'", value),
        }
    }
}

/// A line-level parse failure. Recoverable: the line is skipped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}: {reason} ({context:?})")]
pub struct ParseError {
    pub reason: ParseErrorReason,
    /// 1-based line number in the extracted text.
    pub line: usize,
    /// The offending line.
    pub context: String,
}

impl ParseError {
    pub fn new(reason: ParseErrorReason, line: usize, context: impl Into<String>) -> Self {
        Self {
            reason,
            line,
            context: context.into(),
        }
    }
}

/// Errors related to the SQLite store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite failure.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A stored value could not be decoded.
    #[error("corrupt value in column {column}: {value}")]
    Corrupt { column: String, value: String },

    /// A connection mutex was poisoned by a panicking writer.
    #[error("store connection poisoned")]
    Poisoned,

    /// No document with this content hash.
    #[error("document not found: {0}")]
    NotFound(String),

    /// The database directory could not be created.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to the category rule table.
#[derive(Error, Debug)]
pub enum RuleError {
    #[error("failed to read rule table: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid rule table JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A rule references a category that is not declared.
    #[error("unknown category: {0}")]
    UnknownCategory(String),

    #[error("keyword '{keyword}' already exists in {category}")]
    DuplicateKeyword { category: String, keyword: String },

    #[error("keyword '{keyword}' not found in {category}")]
    MissingKeyword { category: String, keyword: String },

    #[error("keyword cannot be empty")]
    EmptyKeyword,

    #[error("abbreviation and expansion cannot be empty")]
    EmptyAbbreviation,
}

/// Result type for the kassa library.
pub type Result<T> = std::result::Result<T, KassaError>;
