//! Deduplicating SQLite store for documents and purchase records.
//!
//! A document is keyed by its content hash. [`Store::ingest`] writes the
//! document row and all of its records in one IMMEDIATE transaction, so the
//! hash is never visible without its records and importing the same bytes
//! twice is a no-op.

mod schema;

pub use schema::SCHEMA_VERSION;

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, TransactionBehavior};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::categorizer::Categorizer;
use crate::error::StoreError;
use crate::models::category::{Category, UNCATEGORIZED};
use crate::models::document::{
    ContentHash, DocumentHeader, DocumentKind, SourceDocument, StoredDocument,
};
use crate::models::record::{LineKind, PurchaseRecord, Unit, VatRate};
use crate::parser::LayoutParser;
use crate::pdf::ExtractedDocument;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Outcome of [`Store::ingest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IngestOutcome {
    Inserted { document_id: i64, records: usize },
    /// A document with the same content hash is already stored.
    AlreadyImported,
}

/// Filter for [`Store::records`]. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct RecordQuery {
    /// First purchase date, inclusive.
    pub from: Option<NaiveDate>,
    /// Last purchase date, inclusive.
    pub to: Option<NaiveDate>,
    pub category: Option<String>,
    pub document: Option<ContentHash>,
}

/// Spending per category over a date range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryTotal {
    pub category: Category,
    pub records: usize,
    pub total: Decimal,
}

/// A product key no rule matched, with how often it was imported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnknownProduct {
    pub product_key: String,
    pub first_seen: DateTime<Utc>,
    pub occurrences: u32,
}

/// Outcome of [`Store::reparse`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReparseSummary {
    /// Documents whose records were rebuilt.
    pub documents: usize,
    /// Records written for those documents.
    pub records: usize,
    /// Skipped lines, total mismatches and ambiguous categories.
    pub warnings: usize,
    pub skipped: Vec<SkippedDocument>,
}

/// A document [`Store::reparse`] left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedDocument {
    pub hash: ContentHash,
    pub reason: String,
}

/// SQLite-backed store with one writer and one reader connection.
pub struct Store {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let writer = Connection::open(path)?;
        schema::configure(&writer)?;
        schema::setup_database(&writer)?;

        let reader = Connection::open(path)?;
        schema::configure(&reader)?;
        reader.pragma_update(None, "query_only", true)?;

        debug!("Opened store at {}", path.display());
        Ok(Self {
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
        })
    }

    fn writer(&self) -> Result<MutexGuard<'_, Connection>> {
        self.writer.lock().map_err(|_| StoreError::Poisoned)
    }

    fn reader(&self) -> Result<MutexGuard<'_, Connection>> {
        self.reader.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Store a document and its records, unless its hash is already present.
    pub fn ingest(
        &self,
        document: &SourceDocument,
        records: &[PurchaseRecord],
    ) -> Result<IngestOutcome> {
        let mut conn = self.writer()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = Utc::now().to_rfc3339();

        let changed = tx.execute(
            "INSERT INTO documents (
                content_hash, path, kind, document_number, purchase_date,
                total_amount, savings, rules_version, raw_text, imported_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(content_hash) DO NOTHING",
            params![
                document.hash.as_str(),
                document.path.display().to_string(),
                document.kind.as_str(),
                document.header.document_number,
                document.header.purchase_date.map(|d| d.format(DATE_FORMAT).to_string()),
                document.header.total.map(|t| t.to_string()),
                document.header.savings.map(|s| s.to_string()),
                document.rules_version,
                document.raw_text,
                now,
            ],
        )?;

        if changed == 0 {
            tx.rollback()?;
            debug!("{} already imported", document.hash.short());
            return Ok(IngestOutcome::AlreadyImported);
        }

        let document_id = tx.last_insert_rowid();
        insert_records(&tx, document_id, records)?;
        {
            let mut unknown = tx.prepare_cached(
                "INSERT INTO unknown_products (product_key, first_seen, occurrences)
                VALUES (?1, ?2, 1)
                ON CONFLICT(product_key) DO UPDATE SET occurrences = occurrences + 1",
            )?;
            for record in records {
                if record.category.is_uncategorized() && record.line_kind == LineKind::Product {
                    unknown.execute(params![record.product_key, now])?;
                }
            }
        }
        tx.commit()?;

        info!(
            "Stored {} ({} records) as document {}",
            document.file_name(),
            records.len(),
            document_id
        );
        Ok(IngestOutcome::Inserted {
            document_id,
            records: records.len(),
        })
    }

    /// Whether a document with this hash is stored.
    pub fn contains(&self, hash: &ContentHash) -> Result<bool> {
        let conn = self.reader()?;
        let found = conn
            .query_row(
                "SELECT 1 FROM documents WHERE content_hash = ?1",
                params![hash.as_str()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// All stored documents, oldest purchase first.
    pub fn documents(&self) -> Result<Vec<StoredDocument>> {
        let conn = self.reader()?;
        let mut stmt = conn.prepare(
            "SELECT d.id, d.content_hash, d.path, d.kind, d.document_number, d.purchase_date,
                    d.total_amount, d.savings, d.rules_version, d.imported_at,
                    (SELECT COUNT(*) FROM purchase_records r WHERE r.document_id = d.id)
             FROM documents d
             ORDER BY d.purchase_date, d.id",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(DocumentRow {
                id: row.get(0)?,
                hash: row.get(1)?,
                path: row.get(2)?,
                kind: row.get(3)?,
                document_number: row.get(4)?,
                purchase_date: row.get(5)?,
                total: row.get(6)?,
                savings: row.get(7)?,
                rules_version: row.get(8)?,
                imported_at: row.get(9)?,
                record_count: row.get(10)?,
            })
        })?;

        let mut documents = Vec::new();
        for row in rows {
            documents.push(row?.decode()?);
        }
        Ok(documents)
    }

    /// Records matching `query`, ordered by purchase date and position.
    pub fn records(&self, query: &RecordQuery) -> Result<Vec<PurchaseRecord>> {
        let mut conditions = Vec::new();
        let mut values = Vec::new();

        if let Some(from) = query.from {
            values.push(from.format(DATE_FORMAT).to_string());
            conditions.push(format!("r.purchase_date >= ?{}", values.len()));
        }
        if let Some(to) = query.to {
            values.push(to.format(DATE_FORMAT).to_string());
            conditions.push(format!("r.purchase_date <= ?{}", values.len()));
        }
        if let Some(category) = &query.category {
            values.push(category.clone());
            conditions.push(format!("r.category = ?{}", values.len()));
        }
        if let Some(hash) = &query.document {
            values.push(hash.as_str().to_string());
            conditions.push(format!("d.content_hash = ?{}", values.len()));
        }

        let filter = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        let sql = format!(
            "SELECT d.content_hash, r.line_number, r.product, r.product_key, r.quantity, r.unit,
                    r.unit_price, r.total, r.purchase_date, r.category, r.subcategory,
                    r.line_kind, r.vat_rate
             FROM purchase_records r
             JOIN documents d ON d.id = r.document_id
             {}
             ORDER BY r.purchase_date, d.id, r.line_number",
            filter
        );

        let conn = self.reader()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), RecordRow::from_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?.decode()?);
        }
        Ok(records)
    }

    /// Spending per category between two dates (inclusive), largest first.
    pub fn category_totals(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<CategoryTotal>> {
        let records = self.records(&RecordQuery {
            from,
            to,
            ..RecordQuery::default()
        })?;

        let mut totals: BTreeMap<Category, (usize, Decimal)> = BTreeMap::new();
        for record in records {
            let entry = totals.entry(record.category).or_insert((0, Decimal::ZERO));
            entry.0 += 1;
            entry.1 += record.total;
        }

        let mut totals: Vec<CategoryTotal> = totals
            .into_iter()
            .map(|(category, (records, total))| CategoryTotal {
                category,
                records,
                total,
            })
            .collect();
        totals.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.category.cmp(&b.category)));
        Ok(totals)
    }

    /// Recompute every record's category with the current rule table.
    ///
    /// Returns how many records changed. Unknown products that now resolve are
    /// dropped from the unknown list, and products that no longer resolve are
    /// added to it.
    pub fn recategorize(&self, categorizer: &Categorizer) -> Result<usize> {
        let mut conn = self.writer()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let rows: Vec<(i64, String, String, Option<String>)> = {
            let mut stmt = tx.prepare(
                "SELECT id, product_key, category, subcategory FROM purchase_records",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?;
            rows.collect::<rusqlite::Result<_>>()?
        };

        let mut resolved = HashMap::new();
        let mut changed = 0;
        {
            let mut update = tx.prepare_cached(
                "UPDATE purchase_records SET category = ?1, subcategory = ?2 WHERE id = ?3",
            )?;
            for (id, key, category, subcategory) in rows {
                let resolution = resolved
                    .entry(key)
                    .or_insert_with_key(|key| categorizer.resolve(key));
                if resolution.category.as_str() != category
                    || resolution.subcategory != subcategory
                {
                    update.execute(params![
                        resolution.category.as_str(),
                        resolution.subcategory,
                        id
                    ])?;
                    changed += 1;
                }
            }
        }

        sync_unknown_products(&tx)?;
        tx.execute(
            "UPDATE documents SET rules_version = ?1",
            params![categorizer.version()],
        )?;
        tx.commit()?;

        info!("Recategorized {} records (rules version {})", changed, categorizer.version());
        Ok(changed)
    }

    /// Rebuild the records of every stored document from its stored text.
    ///
    /// Runs the current parser for each document's kind and categorizes with
    /// `categorizer`, all in one transaction. A document whose text no longer
    /// parses keeps its records and is listed in [`ReparseSummary::skipped`].
    pub fn reparse(&self, categorizer: &Categorizer, tolerance: Decimal) -> Result<ReparseSummary> {
        let mut conn = self.writer()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let stored: Vec<(i64, String, String, String)> = {
            let mut stmt =
                tx.prepare("SELECT id, content_hash, kind, raw_text FROM documents ORDER BY id")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?;
            rows.collect::<rusqlite::Result<_>>()?
        };

        let mut summary = ReparseSummary::default();
        for (document_id, hash, kind, raw_text) in stored {
            let hash = ContentHash::from_hex(hash);
            let kind = DocumentKind::from_str(&kind).map_err(|_| corrupt("kind", &kind))?;

            let lines = ExtractedDocument::from_text(&raw_text, 1).lines;
            if lines.is_empty() {
                summary.skipped.push(SkippedDocument {
                    hash,
                    reason: "no stored text".to_string(),
                });
                continue;
            }

            let parsed = match LayoutParser::for_kind(kind, tolerance).parse(&lines, &hash) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!("Keeping records of {}: {}", hash.short(), e);
                    summary.skipped.push(SkippedDocument {
                        hash,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            summary.warnings += parsed.errors.len() + usize::from(parsed.total_mismatch.is_some());
            let mut records = parsed.records;
            for record in &mut records {
                if categorizer.categorize(record).is_some() {
                    summary.warnings += 1;
                }
            }

            tx.execute(
                "DELETE FROM purchase_records WHERE document_id = ?1",
                params![document_id],
            )?;
            insert_records(&tx, document_id, &records)?;
            let header = &parsed.header;
            tx.execute(
                "UPDATE documents SET document_number = ?1, purchase_date = ?2,
                    total_amount = ?3, savings = ?4, rules_version = ?5
                 WHERE id = ?6",
                params![
                    header.document_number,
                    parsed.purchase_date.format(DATE_FORMAT).to_string(),
                    header.total.map(|t| t.to_string()),
                    header.savings.map(|s| s.to_string()),
                    categorizer.version(),
                    document_id,
                ],
            )?;

            debug!("Reparsed {} into {} records", hash.short(), records.len());
            summary.documents += 1;
            summary.records += records.len();
        }

        sync_unknown_products(&tx)?;
        tx.commit()?;

        info!(
            "Reparsed {} documents into {} records ({} kept as they were)",
            summary.documents,
            summary.records,
            summary.skipped.len()
        );
        Ok(summary)
    }

    /// Product keys stored as uncategorized, most frequent first.
    pub fn unknown_products(&self) -> Result<Vec<UnknownProduct>> {
        let conn = self.reader()?;
        let mut stmt = conn.prepare(
            "SELECT product_key, first_seen, occurrences FROM unknown_products
             ORDER BY occurrences DESC, product_key",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, u32>(2)?,
            ))
        })?;

        let mut unknown = Vec::new();
        for row in rows {
            let (product_key, first_seen, occurrences) = row?;
            unknown.push(UnknownProduct {
                product_key,
                first_seen: timestamp("first_seen", &first_seen)?,
                occurrences,
            });
        }
        Ok(unknown)
    }

    /// Delete a document and its records. Returns the number of records removed.
    pub fn delete_document(&self, hash: &ContentHash) -> Result<usize> {
        let mut conn = self.writer()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let records: Option<usize> = tx
            .query_row(
                "SELECT (SELECT COUNT(*) FROM purchase_records r WHERE r.document_id = d.id)
                 FROM documents d WHERE d.content_hash = ?1",
                params![hash.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        let Some(records) = records else {
            return Err(StoreError::NotFound(hash.to_string()));
        };

        tx.execute(
            "DELETE FROM documents WHERE content_hash = ?1",
            params![hash.as_str()],
        )?;
        tx.commit()?;

        info!("Deleted document {} ({} records)", hash.short(), records);
        Ok(records)
    }

    /// Number of stored purchase records.
    pub fn record_count(&self) -> Result<usize> {
        let conn = self.reader()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM purchase_records", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn insert_records(
    tx: &rusqlite::Transaction<'_>,
    document_id: i64,
    records: &[PurchaseRecord],
) -> Result<()> {
    let mut insert = tx.prepare_cached(
        "INSERT INTO purchase_records (
            document_id, line_number, product, product_key, quantity, unit,
            unit_price, total, purchase_date, category, subcategory, line_kind, vat_rate
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
    )?;
    for record in records {
        insert.execute(params![
            document_id,
            record.line_number as i64,
            record.product,
            record.product_key,
            record.quantity.to_string(),
            record.unit.as_str(),
            record.unit_price.to_string(),
            record.total.to_string(),
            record.purchase_date.format(DATE_FORMAT).to_string(),
            record.category.as_str(),
            record.subcategory,
            record.line_kind.as_str(),
            record.vat_rate.map(|v| v.display()),
        ])?;
    }
    Ok(())
}

/// Make `unknown_products` match the uncategorized product records.
///
/// Keys that resolve now are removed. Newly uncategorized keys are added with
/// their record count; counts of keys already listed are kept.
fn sync_unknown_products(tx: &rusqlite::Transaction<'_>) -> Result<()> {
    tx.execute(
        "DELETE FROM unknown_products WHERE product_key NOT IN (
            SELECT product_key FROM purchase_records WHERE category = ?1
        )",
        params![UNCATEGORIZED],
    )?;
    let added = tx.execute(
        "INSERT INTO unknown_products (product_key, first_seen, occurrences)
         SELECT product_key, ?3, COUNT(*) FROM purchase_records
         WHERE category = ?1 AND line_kind = ?2
         GROUP BY product_key
         ON CONFLICT(product_key) DO NOTHING",
        params![UNCATEGORIZED, LineKind::Product.as_str(), Utc::now().to_rfc3339()],
    )?;
    if added > 0 {
        debug!("{} product keys became unknown", added);
    }
    Ok(())
}

struct DocumentRow {
    id: i64,
    hash: String,
    path: String,
    kind: String,
    document_number: Option<String>,
    purchase_date: Option<String>,
    total: Option<String>,
    savings: Option<String>,
    rules_version: Option<u32>,
    imported_at: String,
    record_count: i64,
}

impl DocumentRow {
    fn decode(self) -> Result<StoredDocument> {
        let kind = DocumentKind::from_str(&self.kind).map_err(|_| corrupt("kind", &self.kind))?;

        Ok(StoredDocument {
            id: self.id,
            hash: ContentHash::from_hex(self.hash),
            path: self.path,
            kind,
            header: DocumentHeader {
                document_number: self.document_number,
                purchase_date: self
                    .purchase_date
                    .as_deref()
                    .map(|d| date("purchase_date", d))
                    .transpose()?,
                total: self
                    .total
                    .as_deref()
                    .map(|t| decimal("total_amount", t))
                    .transpose()?,
                savings: self
                    .savings
                    .as_deref()
                    .map(|s| decimal("savings", s))
                    .transpose()?,
            },
            rules_version: self.rules_version,
            imported_at: timestamp("imported_at", &self.imported_at)?,
            record_count: self.record_count as usize,
        })
    }
}

struct RecordRow {
    hash: String,
    line_number: i64,
    product: String,
    product_key: String,
    quantity: String,
    unit: String,
    unit_price: String,
    total: String,
    purchase_date: String,
    category: String,
    subcategory: Option<String>,
    line_kind: String,
    vat_rate: Option<String>,
}

impl RecordRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            hash: row.get(0)?,
            line_number: row.get(1)?,
            product: row.get(2)?,
            product_key: row.get(3)?,
            quantity: row.get(4)?,
            unit: row.get(5)?,
            unit_price: row.get(6)?,
            total: row.get(7)?,
            purchase_date: row.get(8)?,
            category: row.get(9)?,
            subcategory: row.get(10)?,
            line_kind: row.get(11)?,
            vat_rate: row.get(12)?,
        })
    }

    fn decode(self) -> Result<PurchaseRecord> {
        let vat_rate = match self.vat_rate.as_deref() {
            Some(rate) => Some(VatRate::from_str(rate).ok_or_else(|| corrupt("vat_rate", rate))?),
            None => None,
        };

        Ok(PurchaseRecord {
            document: ContentHash::from_hex(self.hash),
            line_number: self.line_number as usize,
            product: self.product,
            product_key: self.product_key,
            quantity: decimal("quantity", &self.quantity)?,
            unit: Unit::from_str(&self.unit).ok_or_else(|| corrupt("unit", &self.unit))?,
            unit_price: decimal("unit_price", &self.unit_price)?,
            total: decimal("total", &self.total)?,
            purchase_date: date("purchase_date", &self.purchase_date)?,
            category: Category::new(self.category),
            subcategory: self.subcategory,
            line_kind: LineKind::from_str(&self.line_kind)
                .ok_or_else(|| corrupt("line_kind", &self.line_kind))?,
            vat_rate,
        })
    }
}

fn corrupt(column: &str, value: &str) -> StoreError {
    StoreError::Corrupt {
        column: column.to_string(),
        value: value.to_string(),
    }
}

fn decimal(column: &str, value: &str) -> Result<Decimal> {
    Decimal::from_str(value).map_err(|_| corrupt(column, value))
}

fn date(column: &str, value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|_| corrupt(column, value))
}

fn timestamp(column: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| corrupt(column, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categorizer::RuleTable;
    use crate::models::record::product_key;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 12, d).unwrap()
    }

    fn open() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("kassa.db")).unwrap();
        (dir, store)
    }

    fn document(bytes: &str, date: NaiveDate) -> SourceDocument {
        SourceDocument::new("bon.pdf", DocumentKind::Receipt, bytes.as_bytes())
            .with_header(DocumentHeader {
                document_number: Some("BON-1177".to_string()),
                purchase_date: Some(date),
                total: Some(dec("4.09")),
                savings: None,
            })
            .with_raw_text(bytes)
            .with_rules_version(1)
    }

    fn record(doc: &SourceDocument, line: usize, name: &str, total: &str, category: &str) -> PurchaseRecord {
        PurchaseRecord {
            document: doc.hash.clone(),
            line_number: line,
            product: name.to_string(),
            product_key: product_key(name),
            quantity: Decimal::ONE,
            unit: Unit::Piece,
            unit_price: dec(total),
            total: dec(total),
            purchase_date: doc.header.purchase_date.unwrap(),
            category: Category::new(category),
            subcategory: None,
            line_kind: LineKind::Product,
            vat_rate: None,
        }
    }

    fn receipt(bytes: &str, date: NaiveDate) -> (SourceDocument, Vec<PurchaseRecord>) {
        let doc = document(bytes, date);
        let records = vec![
            record(&doc, 1, "Melk", "1.09", "Dairy"),
            record(&doc, 2, "AH Cola", "3.00", "Soda"),
        ];
        (doc, records)
    }

    #[test]
    fn test_ingest_is_idempotent() {
        let (_dir, store) = open();
        let (doc, records) = receipt("receipt one", day(20));

        let first = store.ingest(&doc, &records).unwrap();
        assert!(matches!(first, IngestOutcome::Inserted { records: 2, .. }));
        assert_eq!(store.record_count().unwrap(), 2);

        // Same bytes under another name
        let renamed = SourceDocument {
            path: "renamed.pdf".into(),
            ..doc.clone()
        };
        assert_eq!(store.ingest(&renamed, &records).unwrap(), IngestOutcome::AlreadyImported);
        assert_eq!(store.record_count().unwrap(), 2);
        assert!(store.contains(&doc.hash).unwrap());
    }

    #[test]
    fn test_records_round_trip_exact_amounts() {
        let (_dir, store) = open();
        let doc = document("weighed", day(20));
        let mut tomato = record(&doc, 4, "TROSTOMAAT", "2.29", "Vegetables");
        tomato.quantity = dec("0.962");
        tomato.unit = Unit::Kilogram;
        tomato.unit_price = dec("2.38");
        tomato.subcategory = Some("Tomatoes".to_string());
        tomato.vat_rate = Some(VatRate::Reduced9);

        store.ingest(&doc, &[tomato.clone()]).unwrap();

        let stored = store.records(&RecordQuery::default()).unwrap();
        assert_eq!(stored, vec![tomato]);
    }

    #[test]
    fn test_same_hash_race_inserts_once() {
        let (dir, store) = open();
        let store = Arc::new(store);
        // A second handle on the same file behaves like another process
        let other = Arc::new(Store::open(&dir.path().join("kassa.db")).unwrap());
        let (doc, records) = receipt("raced receipt", day(20));

        let handles: Vec<_> = [Arc::clone(&store), other]
            .into_iter()
            .map(|s| {
                let doc = doc.clone();
                let records = records.clone();
                std::thread::spawn(move || s.ingest(&doc, &records).unwrap())
            })
            .collect();
        let outcomes: Vec<IngestOutcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let inserted = outcomes
            .iter()
            .filter(|o| matches!(o, IngestOutcome::Inserted { .. }))
            .count();
        assert_eq!(inserted, 1);
        assert!(outcomes.contains(&IngestOutcome::AlreadyImported));
        assert_eq!(store.record_count().unwrap(), 2);
    }

    #[test]
    fn test_concurrent_distinct_documents() {
        let (_dir, store) = open();
        let store = Arc::new(store);

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let (doc, records) = receipt(&format!("receipt {}", i), day(10 + i));
                    store.ingest(&doc, &records).unwrap()
                })
            })
            .collect();
        for handle in handles {
            assert!(matches!(handle.join().unwrap(), IngestOutcome::Inserted { .. }));
        }

        assert_eq!(store.documents().unwrap().len(), 4);
        assert_eq!(store.record_count().unwrap(), 8);
    }

    #[test]
    fn test_query_by_date_and_category() {
        let (_dir, store) = open();
        let (early, early_records) = receipt("early", day(1));
        let (late, late_records) = receipt("late", day(20));
        store.ingest(&early, &early_records).unwrap();
        store.ingest(&late, &late_records).unwrap();

        let dairy = store
            .records(&RecordQuery {
                from: Some(day(10)),
                category: Some("Dairy".to_string()),
                ..RecordQuery::default()
            })
            .unwrap();
        assert_eq!(dairy.len(), 1);
        assert_eq!(dairy[0].document, late.hash);

        let by_document = store
            .records(&RecordQuery {
                document: Some(early.hash.clone()),
                ..RecordQuery::default()
            })
            .unwrap();
        assert_eq!(by_document.len(), 2);

        let totals = store.category_totals(None, Some(day(31))).unwrap();
        assert_eq!(
            totals,
            vec![
                CategoryTotal {
                    category: Category::new("Soda"),
                    records: 2,
                    total: dec("6.00"),
                },
                CategoryTotal {
                    category: Category::new("Dairy"),
                    records: 2,
                    total: dec("2.18"),
                },
            ]
        );
    }

    #[test]
    fn test_documents_listing() {
        let (_dir, store) = open();
        let (doc, records) = receipt("listed", day(20));
        store.ingest(&doc, &records).unwrap();

        let documents = store.documents().unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].hash, doc.hash);
        assert_eq!(documents[0].kind, DocumentKind::Receipt);
        assert_eq!(documents[0].header, doc.header);
        assert_eq!(documents[0].rules_version, Some(1));
        assert_eq!(documents[0].record_count, 2);
    }

    #[test]
    fn test_unknown_products_and_recategorize() {
        let (_dir, store) = open();
        let (doc, mut records) = receipt("unknown", day(20));
        records[0].category = Category::uncategorized();
        store.ingest(&doc, &records).unwrap();

        let (other, mut other_records) = receipt("unknown again", day(21));
        other_records[0].category = Category::uncategorized();
        store.ingest(&other, &other_records).unwrap();

        let unknown = store.unknown_products().unwrap();
        assert_eq!(unknown.len(), 1);
        assert_eq!(unknown[0].product_key, "melk");
        assert_eq!(unknown[0].occurrences, 2);

        let categorizer = Categorizer::new(RuleTable::default_table());
        let changed = store.recategorize(&categorizer).unwrap();
        assert_eq!(changed, 2);
        assert!(store.unknown_products().unwrap().is_empty());

        let dairy = store
            .records(&RecordQuery {
                category: Some("Dairy".to_string()),
                ..RecordQuery::default()
            })
            .unwrap();
        assert_eq!(dairy.len(), 2);

        // Nothing left to change
        assert_eq!(store.recategorize(&categorizer).unwrap(), 0);
    }

    #[test]
    fn test_recategorize_lists_newly_uncategorized_products() {
        let (_dir, store) = open();
        let table = RuleTable::from_json(
            r#"{
                "version": 1,
                "categories": ["Soda"],
                "keyword_rules": [{ "category": "Soda", "keywords": ["fanta"] }]
            }"#,
        )
        .unwrap();
        let categorizer = Categorizer::new(table);

        let doc = document("fanta", day(20));
        let mut discount = record(&doc, 2, "BONUS FANTA", "-0.50", "Soda");
        discount.line_kind = LineKind::Discount;
        let records = vec![record(&doc, 1, "Fanta", "1.89", "Soda"), discount];
        store.ingest(&doc, &records).unwrap();
        assert!(store.unknown_products().unwrap().is_empty());

        categorizer.remove_keyword("Soda", "fanta").unwrap();
        assert_eq!(store.recategorize(&categorizer).unwrap(), 2);

        let unknown = store.unknown_products().unwrap();
        assert_eq!(unknown.len(), 1);
        assert_eq!(unknown[0].product_key, "fanta");
        assert_eq!(unknown[0].occurrences, 1);

        // Later imports count on; recategorizing keeps the count
        let again = document("fanta again", day(21));
        let more = vec![record(&again, 1, "Fanta", "1.89", UNCATEGORIZED)];
        store.ingest(&again, &more).unwrap();
        assert_eq!(store.recategorize(&categorizer).unwrap(), 0);
        assert_eq!(store.unknown_products().unwrap()[0].occurrences, 2);
    }

    #[test]
    fn test_reparse_rebuilds_records_from_stored_text() {
        let (_dir, store) = open();
        let text = "14:26 20-12-2025\nMelk 1 1.09 1.09\nAH Cola 2 1.50 3.00\n";
        let doc = document(text, day(20));
        store
            .ingest(&doc, &[record(&doc, 1, "Melk", "1.09", UNCATEGORIZED)])
            .unwrap();

        let undated = document("geen datum\nMelk 1 1.09 1.09\n", day(21));
        store
            .ingest(&undated, &[record(&undated, 2, "Melk", "1.09", "Dairy")])
            .unwrap();
        assert_eq!(store.unknown_products().unwrap().len(), 1);

        let summary = store
            .reparse(&Categorizer::default(), Decimal::new(1, 2))
            .unwrap();
        assert_eq!(summary.documents, 1);
        assert_eq!(summary.records, 2);
        assert_eq!(summary.skipped.len(), 1);
        assert_eq!(summary.skipped[0].hash, undated.hash);

        let rebuilt: Vec<(usize, String, Category)> = store
            .records(&RecordQuery {
                document: Some(doc.hash.clone()),
                ..RecordQuery::default()
            })
            .unwrap()
            .into_iter()
            .map(|r| (r.line_number, r.product, r.category))
            .collect();
        assert_eq!(
            rebuilt,
            vec![
                (2, "Melk".to_string(), Category::new("Dairy")),
                (3, "AH Cola".to_string(), Category::new("Soda")),
            ]
        );

        // The undated document keeps what it had
        assert_eq!(store.record_count().unwrap(), 3);
        assert!(store.unknown_products().unwrap().is_empty());
    }

    #[test]
    fn test_delete_cascades_to_records() {
        let (_dir, store) = open();
        let (doc, records) = receipt("deleted", day(20));
        store.ingest(&doc, &records).unwrap();

        assert_eq!(store.delete_document(&doc.hash).unwrap(), 2);
        assert_eq!(store.record_count().unwrap(), 0);
        assert!(!store.contains(&doc.hash).unwrap());
        assert!(matches!(
            store.delete_document(&doc.hash),
            Err(StoreError::NotFound(_))
        ));

        // Re-import after an explicit delete is allowed
        assert!(matches!(
            store.ingest(&doc, &records).unwrap(),
            IngestOutcome::Inserted { .. }
        ));
    }
}
