//! Online order invoice (factuur) layout.

use rust_decimal::Decimal;

use super::rules::patterns::*;
use super::rules::{find_long_date, find_numeric_date, has_amount, parse_dutch_date};
use super::{
    amount, quantity, unit_price_from_total, ItemLine, Layout, LineClass, LineItemParser,
    LineRecords, RecordContext, Records,
};
use crate::error::ParseErrorReason;
use crate::models::document::{DocumentHeader, DocumentKind};
use crate::models::record::{LineKind, Unit, VatRate};
use crate::pdf::TextLine;

/// Page furniture and address blocks between item rows.
const SKIP_PREFIXES: &[&str] = &["subtotaal", "pagina"];

const SKIP_FRAGMENTS: &[&str] = &[
    "factuurnummer",
    "debiteurnummer",
    "bestelling",
    "afleverdatum",
    "bezorgadres",
    "alle bedragen",
    "vragen over",
];

const DEPOSIT_NAMES: &[&str] = &["statiegeld", "emballage", "klapkrat"];

const FEE_NAMES: &[&str] = &["bezorgkosten", "servicekosten", "verpakkingsmateriaal"];

/// Parser for Albert Heijn online order invoices.
///
/// Item rows read `Name Qty Btw Excl BtwAmount Incl`, e.g.
/// `AH Halfvolle melk 2 9% 2,00 0,18 2,18`.
#[derive(Debug, Clone)]
pub struct InvoiceParser {
    tolerance: Decimal,
}

impl InvoiceParser {
    pub fn new(tolerance: Decimal) -> Self {
        Self { tolerance }
    }

    pub fn tolerance(&self) -> Decimal {
        self.tolerance
    }

    fn item_line(&self, text: &str) -> Result<Option<ItemLine>, ParseErrorReason> {
        let Some(caps) = INVOICE_ITEM.captures(text) else {
            return Ok(None);
        };

        let name = caps[1].trim().to_string();
        let qty = quantity(&caps[2])?;
        if qty.is_zero() {
            return Err(ParseErrorReason::InvalidQuantity(caps[2].to_string()));
        }

        let rate: String = caps[3].chars().filter(|c| !c.is_whitespace()).collect();
        let vat_rate = VatRate::from_str(&rate)
            .ok_or_else(|| ParseErrorReason::InvalidNumber(caps[3].to_string()))?;

        let excl = amount(&caps[4])?;
        let vat = amount(&caps[5])?;
        let incl = amount(&caps[6])?;
        if (excl + vat - incl).abs() > self.tolerance {
            return Err(ParseErrorReason::VatMismatch {
                expected: excl + vat,
                actual: incl,
            });
        }

        let lower = name.to_lowercase();
        let kind = if DEPOSIT_NAMES.iter().any(|n| lower.contains(n)) {
            LineKind::Deposit
        } else if FEE_NAMES.iter().any(|n| lower.contains(n)) {
            LineKind::Fee
        } else if incl.is_sign_negative() {
            LineKind::Discount
        } else {
            LineKind::Product
        };

        Ok(Some(ItemLine {
            name,
            quantity: qty,
            unit: Unit::Piece,
            unit_price: unit_price_from_total(incl, qty, self.tolerance),
            total: incl,
            kind,
            vat_rate: Some(vat_rate),
        }))
    }
}

fn is_table_header(lower: &str) -> bool {
    lower.contains("aantal") && lower.contains("btw")
}

impl Layout for InvoiceParser {
    fn item_region(&self, lines: &[TextLine]) -> Option<usize> {
        lines
            .iter()
            .position(|l| is_table_header(&l.text.to_lowercase()))
            .map(|i| i + 1)
    }

    fn classify(&self, line: &TextLine, _in_discounts: bool) -> LineClass {
        let lower = line.text.to_lowercase();

        if lower.starts_with("totaal") {
            return LineClass::Stop;
        }
        if SKIP_PREFIXES.iter().any(|p| lower.starts_with(p))
            || SKIP_FRAGMENTS.iter().any(|f| lower.contains(f))
            || is_table_header(&lower)
        {
            return LineClass::Skip;
        }
        if !has_amount(&line.text) {
            return LineClass::NamePrefix;
        }

        match self.item_line(&line.text) {
            Ok(Some(item)) => LineClass::Item(item),
            Ok(None) => LineClass::Invalid(ParseErrorReason::UnrecognizedLayout),
            Err(reason) => LineClass::Invalid(reason),
        }
    }

    fn tolerance(&self) -> Decimal {
        self.tolerance
    }
}

impl LineItemParser for InvoiceParser {
    fn kind(&self) -> DocumentKind {
        DocumentKind::Invoice
    }

    fn header(&self, lines: &[TextLine]) -> DocumentHeader {
        let mut header = DocumentHeader::default();

        for line in lines {
            let text = line.text.as_str();

            if header.document_number.is_none() {
                if let Some(caps) = INVOICE_NUMBER.captures(text) {
                    header.document_number = Some(caps[1].to_string());
                }
            }
            if header.purchase_date.is_none() {
                if let Some(caps) = INVOICE_DATE.captures(text) {
                    header.purchase_date = parse_dutch_date(&caps[1]);
                }
            }
            if header.total.is_none() {
                if let Some(caps) = INVOICE_TOTAL.captures(text) {
                    header.total = amount(&caps[1]).ok();
                }
            }
            if header.savings.is_none() {
                if let Some(caps) = INVOICE_SAVINGS.captures(text) {
                    header.savings = amount(&caps[1]).ok().map(|s| s.abs());
                }
            }
        }

        // No labelled date: take the first date anywhere
        if header.purchase_date.is_none() {
            header.purchase_date = lines
                .iter()
                .find_map(|l| find_long_date(&l.text).or_else(|| find_numeric_date(&l.text)));
        }

        header
    }

    fn records<'a>(&'a self, lines: &'a [TextLine], ctx: RecordContext) -> Records<'a> {
        Box::new(LineRecords::new(self, lines, ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::document::ContentHash;
    use crate::pdf::ExtractedDocument;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use std::str::FromStr;

    const FACTUUR: &str = "\
Albert Heijn B.V.
Factuurnummer 2025-118822
Datum 14 december 2025
Afleverdatum 15 december 2025
Omschrijving                 Aantal  Btw   Excl. btw  Btw   Incl. btw
AH Halfvolle melk                 2  9%         2,00  0,18       2,18
AH Cola zero
6 x 1,5 l                         1  21%        4,13  0,87       5,00
Statiegeld                        6  Geen       1,50  0,00       1,50
Bezorgkosten                      1  21%        2,48  0,52       3,00
AH Elstar appels                  1  9%         2,00  0,18       2,50
Pagina 1 van 2
Omschrijving                 Aantal  Btw   Excl. btw  Btw   Incl. btw
AH Jong belegen kaas BONUS        1  9%         4,59  0,41       5,00
Bonus korting                     1  9%        -0,92 -0,08      -1,00
Subtotaal                                                       16,68
Totaal inclusief btw                                            15,68
Uw voordeel                                                      1,00
";

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn lines() -> Vec<TextLine> {
        ExtractedDocument::from_text(FACTUUR, 1).lines
    }

    #[test]
    fn test_header() {
        let header = InvoiceParser::new(Decimal::new(1, 2)).header(&lines());

        assert_eq!(header.document_number.as_deref(), Some("2025-118822"));
        assert_eq!(header.purchase_date, NaiveDate::from_ymd_opt(2025, 12, 14));
        assert_eq!(header.total, Some(dec("15.68")));
        assert_eq!(header.savings, Some(dec("1.00")));
    }

    #[test]
    fn test_invoice_lines() {
        let parser = InvoiceParser::new(Decimal::new(1, 2));
        let doc = lines();
        let ctx = RecordContext {
            document: ContentHash::of(FACTUUR.as_bytes()),
            purchase_date: NaiveDate::from_ymd_opt(2025, 12, 14).unwrap(),
        };
        let results: Vec<_> = parser.records(&doc, ctx).collect();

        let records: Vec<(String, Decimal, Decimal, LineKind, Option<VatRate>)> = results
            .iter()
            .filter_map(|r| r.as_ref().ok())
            .map(|r| (r.product.clone(), r.quantity, r.total, r.line_kind, r.vat_rate))
            .collect();
        assert_eq!(
            records,
            vec![
                ("AH Halfvolle melk".to_string(), dec("2"), dec("2.18"), LineKind::Product, Some(VatRate::Reduced9)),
                ("AH Cola zero 6 x 1,5 l".to_string(), dec("1"), dec("5.00"), LineKind::Product, Some(VatRate::Standard21)),
                ("Statiegeld".to_string(), dec("6"), dec("1.50"), LineKind::Deposit, Some(VatRate::Exempt)),
                ("Bezorgkosten".to_string(), dec("1"), dec("3.00"), LineKind::Fee, Some(VatRate::Standard21)),
                ("AH Jong belegen kaas BONUS".to_string(), dec("1"), dec("5.00"), LineKind::Product, Some(VatRate::Reduced9)),
                ("Bonus korting".to_string(), dec("1"), dec("-1.00"), LineKind::Discount, Some(VatRate::Reduced9)),
            ]
        );

        let errors: Vec<_> = results.iter().filter_map(|r| r.as_ref().err()).collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].line, 11);
        assert_eq!(
            errors[0].reason,
            ParseErrorReason::VatMismatch {
                expected: dec("2.18"),
                actual: dec("2.50"),
            }
        );
    }

    #[test]
    fn test_unit_price_from_incl() {
        let parser = InvoiceParser::new(Decimal::new(1, 2));
        let item = parser
            .item_line("AH Halfvolle melk 2 9% 2,00 0,18 2,18")
            .unwrap()
            .unwrap();

        assert_eq!(item.unit_price, dec("1.09"));
    }

    #[test]
    fn test_large_quantity_line_is_accepted() {
        let parser = InvoiceParser::new(Decimal::new(1, 2));
        let text = "Omschrijving Aantal Btw Excl. btw Btw Incl. btw\nAH Spijkers 1000 21% 1,02 0,21 1,23";
        let doc = ExtractedDocument::from_text(text, 1).lines;
        let ctx = RecordContext {
            document: ContentHash::of(text.as_bytes()),
            purchase_date: NaiveDate::from_ymd_opt(2025, 12, 14).unwrap(),
        };
        let results: Vec<_> = parser.records(&doc, ctx).collect();

        assert_eq!(results.len(), 1);
        let record = results[0].as_ref().unwrap();
        assert_eq!(record.unit_price, dec("0.00123"));
        assert_eq!(record.total, dec("1.23"));
    }

    #[test]
    fn test_numeric_date_fallback() {
        let doc = ExtractedDocument::from_text("Factuur\nBesteldatum: 02-03-2025", 1).lines;
        let header = InvoiceParser::new(Decimal::new(1, 2)).header(&doc);

        assert_eq!(header.purchase_date, NaiveDate::from_ymd_opt(2025, 3, 2));
    }
}
