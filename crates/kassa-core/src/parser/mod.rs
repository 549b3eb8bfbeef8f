//! Line-item extraction for receipts and invoices.
//!
//! A [`LineItemParser`] turns the text lines of one document into purchase
//! records. Each supported layout is one variant of [`LayoutParser`], selected
//! by [`DocumentKind`].

pub mod invoice;
pub mod receipt;
pub mod rules;

pub use invoice::InvoiceParser;
pub use receipt::ReceiptParser;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::error::{ExtractionError, ParseError, ParseErrorReason};
use crate::models::category::Category;
use crate::models::document::{ContentHash, DocumentHeader, DocumentKind};
use crate::models::record::{product_key, LineKind, PurchaseRecord, Unit, VatRate};
use crate::pdf::TextLine;

/// Lazy sequence of line results. Finite; one pass per call to `records`.
pub type Records<'a> = Box<dyn Iterator<Item = Result<PurchaseRecord, ParseError>> + Send + 'a>;

/// Document-level values stamped onto every record.
#[derive(Debug, Clone)]
pub struct RecordContext {
    pub document: ContentHash,
    pub purchase_date: NaiveDate,
}

/// Trait for line-item parsers.
pub trait LineItemParser: Send + Sync {
    /// Document kind this parser understands.
    fn kind(&self) -> DocumentKind;

    /// Read header fields (number, date, stated totals).
    fn header(&self, lines: &[TextLine]) -> DocumentHeader;

    /// Walk the item region. Calling this again restarts from the first line.
    fn records<'a>(&'a self, lines: &'a [TextLine], ctx: RecordContext) -> Records<'a>;
}

/// Stated document total that the records do not add up to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TotalMismatch {
    pub stated: Decimal,
    pub computed: Decimal,
}

/// Everything extracted from one document.
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub header: DocumentHeader,
    pub purchase_date: NaiveDate,
    pub records: Vec<PurchaseRecord>,
    /// Lines that were skipped.
    pub errors: Vec<ParseError>,
    pub total_mismatch: Option<TotalMismatch>,
}

/// Parser dispatch by document kind.
#[derive(Debug, Clone)]
pub enum LayoutParser {
    Receipt(ReceiptParser),
    Invoice(InvoiceParser),
}

impl LayoutParser {
    pub fn for_kind(kind: DocumentKind, tolerance: Decimal) -> Self {
        match kind {
            DocumentKind::Receipt => LayoutParser::Receipt(ReceiptParser::new(tolerance)),
            DocumentKind::Invoice => LayoutParser::Invoice(InvoiceParser::new(tolerance)),
        }
    }

    pub fn tolerance(&self) -> Decimal {
        match self {
            LayoutParser::Receipt(p) => p.tolerance(),
            LayoutParser::Invoice(p) => p.tolerance(),
        }
    }

    /// Parse a whole document: header, records and line warnings.
    ///
    /// Fails only when the purchase date is missing; bad lines are collected
    /// in [`ParsedDocument::errors`].
    pub fn parse(
        &self,
        lines: &[TextLine],
        document: &ContentHash,
    ) -> Result<ParsedDocument, ExtractionError> {
        let header = self.header(lines);
        let purchase_date = header
            .purchase_date
            .ok_or_else(|| ExtractionError::MissingField("purchase date".to_string()))?;

        let ctx = RecordContext {
            document: document.clone(),
            purchase_date,
        };

        let mut records = Vec::new();
        let mut errors = Vec::new();
        for result in self.records(lines, ctx) {
            match result {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!("Skipping {}", e);
                    errors.push(e);
                }
            }
        }

        let total_mismatch = header.total.and_then(|stated| {
            let computed: Decimal = records.iter().map(|r| r.total).sum();
            if !records.is_empty() && (computed - stated).abs() > self.tolerance() {
                Some(TotalMismatch { stated, computed })
            } else {
                None
            }
        });

        debug!(
            "Parsed {} {} records ({} skipped lines)",
            records.len(),
            self.kind(),
            errors.len()
        );

        Ok(ParsedDocument {
            header,
            purchase_date,
            records,
            errors,
            total_mismatch,
        })
    }
}

impl LineItemParser for LayoutParser {
    fn kind(&self) -> DocumentKind {
        match self {
            LayoutParser::Receipt(p) => p.kind(),
            LayoutParser::Invoice(p) => p.kind(),
        }
    }

    fn header(&self, lines: &[TextLine]) -> DocumentHeader {
        match self {
            LayoutParser::Receipt(p) => p.header(lines),
            LayoutParser::Invoice(p) => p.header(lines),
        }
    }

    fn records<'a>(&'a self, lines: &'a [TextLine], ctx: RecordContext) -> Records<'a> {
        match self {
            LayoutParser::Receipt(p) => p.records(lines, ctx),
            LayoutParser::Invoice(p) => p.records(lines, ctx),
        }
    }
}

/// One item line as read by a layout, before it becomes a record.
#[derive(Debug, Clone)]
pub(crate) struct ItemLine {
    pub name: String,
    pub quantity: Decimal,
    pub unit: Unit,
    pub unit_price: Decimal,
    pub total: Decimal,
    pub kind: LineKind,
    pub vat_rate: Option<VatRate>,
}

/// How a layout reads one line of its item region.
#[derive(Debug)]
pub(crate) enum LineClass {
    Item(ItemLine),
    /// Text without amounts: the first part of a product name.
    NamePrefix,
    Skip,
    /// Items end here, discount lines follow.
    StartDiscounts,
    Stop,
    Invalid(ParseErrorReason),
}

/// The per-layout half of record extraction.
pub(crate) trait Layout: Sync {
    /// Index of the first line after the item table header, if there is one.
    fn item_region(&self, lines: &[TextLine]) -> Option<usize>;

    fn classify(&self, line: &TextLine, in_discounts: bool) -> LineClass;

    fn tolerance(&self) -> Decimal;
}

/// Shared walker over the item region of a document.
pub(crate) struct LineRecords<'a, L: Layout> {
    layout: &'a L,
    lines: &'a [TextLine],
    pos: usize,
    /// Multi-line names are only joined below a recognized table header.
    join_names: bool,
    in_discounts: bool,
    name_prefix: Vec<&'a str>,
    ctx: RecordContext,
    done: bool,
}

impl<'a, L: Layout> LineRecords<'a, L> {
    pub(crate) fn new(layout: &'a L, lines: &'a [TextLine], ctx: RecordContext) -> Self {
        let region = layout.item_region(lines);
        Self {
            layout,
            lines,
            pos: region.unwrap_or(0),
            join_names: region.is_some(),
            in_discounts: false,
            name_prefix: Vec::new(),
            ctx,
            done: false,
        }
    }

    fn build(&mut self, line: &TextLine, item: ItemLine) -> Result<PurchaseRecord, ParseError> {
        let name = if self.name_prefix.is_empty() {
            item.name
        } else {
            let mut joined = self.name_prefix.join(" ");
            joined.push(' ');
            joined.push_str(&item.name);
            self.name_prefix.clear();
            joined
        };

        if item.quantity <= Decimal::ZERO {
            return Err(ParseError::new(
                ParseErrorReason::InvalidQuantity(item.quantity.to_string()),
                line.number,
                &line.text,
            ));
        }

        let record = PurchaseRecord {
            document: self.ctx.document.clone(),
            line_number: line.number,
            product_key: product_key(&name),
            product: name,
            quantity: item.quantity,
            unit: item.unit,
            unit_price: item.unit_price,
            total: item.total,
            purchase_date: self.ctx.purchase_date,
            category: Category::uncategorized(),
            subcategory: None,
            line_kind: item.kind,
            vat_rate: item.vat_rate,
        };

        if !record.reconciles(self.layout.tolerance()) {
            return Err(ParseError::new(
                ParseErrorReason::TotalMismatch {
                    expected: record.computed_total(),
                    actual: record.total,
                },
                line.number,
                &line.text,
            ));
        }

        Ok(record)
    }
}

impl<'a, L: Layout> Iterator for LineRecords<'a, L> {
    type Item = Result<PurchaseRecord, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        let lines = self.lines;
        while !self.done && self.pos < lines.len() {
            let line = &lines[self.pos];
            self.pos += 1;

            match self.layout.classify(line, self.in_discounts) {
                LineClass::Skip => continue,
                LineClass::NamePrefix => {
                    if self.join_names {
                        self.name_prefix.push(&line.text);
                    }
                }
                LineClass::StartDiscounts => {
                    self.in_discounts = true;
                    self.name_prefix.clear();
                }
                LineClass::Stop => self.done = true,
                LineClass::Invalid(reason) => {
                    self.name_prefix.clear();
                    return Some(Err(ParseError::new(reason, line.number, &line.text)));
                }
                LineClass::Item(item) => {
                    let result = self.build(line, item);
                    self.name_prefix.clear();
                    if let Ok(record) = &result {
                        trace!(
                            "Line {}: {} x {} = {}",
                            record.line_number, record.quantity, record.product, record.total
                        );
                    }
                    return Some(result);
                }
            }
        }
        None
    }
}

/// Parse an amount captured by a layout regex.
pub(crate) fn amount(s: &str) -> Result<Decimal, ParseErrorReason> {
    rules::parse_dutch_amount(s).ok_or_else(|| ParseErrorReason::InvalidNumber(s.to_string()))
}

/// Unit price of a line that only states its total.
///
/// Rounded to 4 places when the rounded price still multiplies back to the
/// total; large quantities keep the exact quotient.
pub(crate) fn unit_price_from_total(total: Decimal, quantity: Decimal, tolerance: Decimal) -> Decimal {
    let exact = total / quantity;
    let rounded = exact.round_dp(4);
    if (rounded * quantity - total).abs() <= tolerance {
        rounded
    } else {
        exact.normalize()
    }
}

/// Parse a quantity captured by a layout regex.
pub(crate) fn quantity(s: &str) -> Result<Decimal, ParseErrorReason> {
    rules::parse_quantity(s).ok_or_else(|| ParseErrorReason::InvalidNumber(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::ExtractedDocument;
    use pretty_assertions::assert_eq;

    fn lines(text: &str) -> Vec<TextLine> {
        ExtractedDocument::from_text(text, 1).lines
    }

    #[test]
    fn test_missing_date_fails_document() {
        let parser = LayoutParser::for_kind(DocumentKind::Receipt, Decimal::new(1, 2));
        let result = parser.parse(&lines("Melk 1 1.09 1.09"), &ContentHash::of(b"x"));

        assert!(matches!(result, Err(ExtractionError::MissingField(_))));
    }

    #[test]
    fn test_total_mismatch_reported() {
        let parser = LayoutParser::for_kind(DocumentKind::Receipt, Decimal::new(1, 2));
        let text = "20-12-2025\nMelk 1 1.09 1.09\nTOTAAL 5,00";

        let parsed = parser.parse(&lines(text), &ContentHash::of(text.as_bytes())).unwrap();

        assert_eq!(
            parsed.total_mismatch,
            Some(TotalMismatch {
                stated: Decimal::new(500, 2),
                computed: Decimal::new(109, 2),
            })
        );
    }

    #[test]
    fn test_records_restart() {
        let parser = LayoutParser::for_kind(DocumentKind::Receipt, Decimal::new(1, 2));
        let doc = lines("Melk 1 1.09 1.09\nAH Cola 2 1.50 3.00");
        let ctx = RecordContext {
            document: ContentHash::of(b"doc"),
            purchase_date: NaiveDate::from_ymd_opt(2025, 12, 20).unwrap(),
        };

        let first: Vec<_> = parser.records(&doc, ctx.clone()).collect();
        let second: Vec<_> = parser.records(&doc, ctx).collect();

        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
    }

    #[test]
    fn test_every_record_reconciles_or_is_reported() {
        let tolerance = Decimal::new(1, 2);
        let parser = LayoutParser::for_kind(DocumentKind::Receipt, tolerance);
        let text = "20-12-2025\nMelk 1 1.09 1.09\nAH Cola 2 1.50 3.50\n0 BROOD 2,00";

        let parsed = parser.parse(&lines(text), &ContentHash::of(text.as_bytes())).unwrap();

        assert!(parsed.records.iter().all(|r| r.reconciles(tolerance)));
        assert_eq!(parsed.records.len(), 1);
        let bad_lines: Vec<usize> = parsed.errors.iter().map(|e| e.line).collect();
        assert_eq!(bad_lines, vec![3, 4]);
    }
}
