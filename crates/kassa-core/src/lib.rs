//! Core library for supermarket receipt ingestion.
//!
//! This crate provides:
//! - PDF reading (text extraction in reading order)
//! - Line-item parsing for Albert Heijn receipts (kassabon) and online invoices
//! - Product categorization against a versioned, reloadable rule table
//! - An idempotent SQLite store keyed by document content hash
//! - A concurrent import orchestrator with per-file reports

pub mod categorizer;
pub mod error;
pub mod import;
pub mod models;
pub mod parser;
pub mod pdf;
pub mod store;

pub use categorizer::{CategorizationAmbiguity, Categorizer, MatchSource, Resolution, RuleTable};
pub use error::{
    ExtractionError, KassaError, ParseError, ParseErrorReason, PdfError, Result, RuleError,
    StoreError,
};
pub use import::{FileOutcome, FileReport, FileState, ImportOrchestrator, ImportWarning, Summary};
pub use models::category::Category;
pub use models::config::KassaConfig;
pub use models::document::{ContentHash, DocumentHeader, DocumentKind, SourceDocument};
pub use models::record::{LineKind, PurchaseRecord, Unit, VatRate};
pub use parser::{LayoutParser, LineItemParser, ParsedDocument};
pub use pdf::{DocumentReader, ExtractedDocument, PdfExtractor, PlainTextReader};
pub use store::{IngestOutcome, RecordQuery, ReparseSummary, Store};
