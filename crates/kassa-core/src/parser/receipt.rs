//! In-store receipt (kassabon) layout.

use rust_decimal::Decimal;

use super::rules::patterns::*;
use super::rules::{find_numeric_date, has_amount};
use super::{
    amount, quantity, unit_price_from_total, ItemLine, Layout, LineClass, LineItemParser,
    LineRecords, RecordContext, Records,
};
use crate::error::ParseErrorReason;
use crate::models::document::{DocumentHeader, DocumentKind};
use crate::models::record::{LineKind, Unit};
use crate::pdf::TextLine;

/// Lines that end the receipt body.
const END_MARKERS: &[&str] = &[
    "TOTAAL",
    "UW VOORDEEL",
    "BETAALD",
    "PINNEN",
    "SPAARACTIES",
    "KOOPZEGELS",
];

/// Lines inside the body that are never items.
const SKIP_MARKERS: &[&str] = &["BONUSKAART", "AIRMILES", "OMSCHRIJVING"];

/// Names that mark bottle deposits and packaging surcharges.
const DEPOSIT_MARKERS: &[&str] = &["STATIEGELD", "EMBALLAGE"];

/// Parser for Albert Heijn kassabonnen.
///
/// Item shapes, checked in this order:
/// - `0.962KG TROSTOMAAT 2,38 2,29` (weighed)
/// - `2 LEFFE BLOND 1,11 2,22 B`
/// - `AH Cola 2 1.50 3.00` (quantity after the name)
/// - `1 PAPRIKA GEEL 1,29` (total only)
/// - `+STATIEGELD 0,30`
/// - `NAME 1,29`
///
/// After `SUBTOTAAL` only discount lines (`BONUS AH COLA -0,50`) are read.
#[derive(Debug, Clone)]
pub struct ReceiptParser {
    tolerance: Decimal,
}

impl ReceiptParser {
    pub fn new(tolerance: Decimal) -> Self {
        Self { tolerance }
    }

    pub fn tolerance(&self) -> Decimal {
        self.tolerance
    }

    fn item_line(&self, text: &str) -> Result<Option<ItemLine>, ParseErrorReason> {
        // Bonus marker after the amounts
        let text = text.strip_suffix(" B").unwrap_or(text).trim_end();

        if let Some(caps) = RECEIPT_WEIGHED.captures(text) {
            return Ok(Some(item(
                &caps[2],
                quantity(&caps[1])?,
                Unit::Kilogram,
                amount(&caps[3])?,
                amount(&caps[4])?,
            )));
        }

        if let Some(caps) = RECEIPT_QTY_UNIT_TOTAL.captures(text) {
            return Ok(Some(item(
                &caps[2],
                quantity(&caps[1])?,
                Unit::Piece,
                amount(&caps[3])?,
                amount(&caps[4])?,
            )));
        }

        if let Some(caps) = RECEIPT_NAME_QTY_UNIT_TOTAL.captures(text) {
            return Ok(Some(item(
                &caps[1],
                quantity(&caps[2])?,
                Unit::Piece,
                amount(&caps[3])?,
                amount(&caps[4])?,
            )));
        }

        if let Some(caps) = RECEIPT_QTY_TOTAL.captures(text) {
            let qty = quantity(&caps[1])?;
            if qty.is_zero() {
                return Err(ParseErrorReason::InvalidQuantity(caps[1].to_string()));
            }
            let total = amount(&caps[3])?;
            let unit_price = unit_price_from_total(total, qty, self.tolerance);
            return Ok(Some(item(&caps[2], qty, Unit::Piece, unit_price, total)));
        }

        if let Some(caps) = RECEIPT_SURCHARGE.captures(text) {
            let total = amount(&caps[2])?;
            let mut line = item(&caps[1], Decimal::ONE, Unit::Piece, total, total);
            line.kind = LineKind::Deposit;
            return Ok(Some(line));
        }

        if let Some(caps) = RECEIPT_NAME_TOTAL.captures(text) {
            let total = amount(&caps[2])?;
            return Ok(Some(item(&caps[1], Decimal::ONE, Unit::Piece, total, total)));
        }

        Ok(None)
    }

    fn discount_line(&self, text: &str) -> Result<Option<ItemLine>, ParseErrorReason> {
        let Some(caps) = RECEIPT_NAME_TOTAL.captures(text) else {
            return Ok(None);
        };

        let name = &caps[1];
        let mut total = amount(&caps[2])?;
        if name.to_uppercase().starts_with("BONUS") {
            total = -total.abs();
        }
        if !total.is_sign_negative() {
            return Ok(None);
        }

        let mut line = item(name, Decimal::ONE, Unit::Piece, total, total);
        line.kind = LineKind::Discount;
        Ok(Some(line))
    }
}

fn item(name: &str, quantity: Decimal, unit: Unit, unit_price: Decimal, total: Decimal) -> ItemLine {
    let name = name.trim().to_string();
    let upper = name.to_uppercase();

    let kind = if DEPOSIT_MARKERS.iter().any(|m| upper.contains(m)) {
        LineKind::Deposit
    } else if total.is_sign_negative() {
        LineKind::Discount
    } else {
        LineKind::Product
    };

    ItemLine {
        name,
        quantity,
        unit,
        unit_price,
        total,
        kind,
        vat_rate: None,
    }
}

impl Layout for ReceiptParser {
    fn item_region(&self, lines: &[TextLine]) -> Option<usize> {
        lines
            .iter()
            .position(|l| l.text.to_uppercase().contains("OMSCHRIJVING"))
            .map(|i| i + 1)
    }

    fn classify(&self, line: &TextLine, in_discounts: bool) -> LineClass {
        let upper = line.text.to_uppercase();

        if upper.starts_with("SUBTOTAAL") {
            return LineClass::StartDiscounts;
        }
        if END_MARKERS.iter().any(|m| upper.starts_with(m)) {
            return LineClass::Stop;
        }
        if SKIP_MARKERS.iter().any(|m| upper.contains(m)) {
            return LineClass::Skip;
        }
        if !has_amount(&line.text) {
            return if in_discounts {
                LineClass::Skip
            } else {
                LineClass::NamePrefix
            };
        }

        let parsed = if in_discounts {
            self.discount_line(&line.text)
        } else {
            self.item_line(&line.text)
        };

        match parsed {
            Ok(Some(item)) => LineClass::Item(item),
            Ok(None) if in_discounts => LineClass::Skip,
            Ok(None) => LineClass::Invalid(ParseErrorReason::UnrecognizedLayout),
            Err(reason) => LineClass::Invalid(reason),
        }
    }

    fn tolerance(&self) -> Decimal {
        self.tolerance
    }
}

impl LineItemParser for ReceiptParser {
    fn kind(&self) -> DocumentKind {
        DocumentKind::Receipt
    }

    fn header(&self, lines: &[TextLine]) -> DocumentHeader {
        let mut header = DocumentHeader::default();

        for line in lines {
            let text = line.text.as_str();

            if header.document_number.is_none() {
                if let Some(caps) = RECEIPT_NUMBER.captures(text) {
                    header.document_number = Some(format!("BON-{}", &caps[1]));
                }
            }
            if header.purchase_date.is_none() {
                header.purchase_date = find_numeric_date(text);
            }
            if header.total.is_none() {
                if let Some(caps) = RECEIPT_TOTAL.captures(text) {
                    header.total = amount(&caps[1]).ok();
                }
            }
            if header.savings.is_none() {
                if let Some(caps) = RECEIPT_SAVINGS.captures(text) {
                    header.savings = amount(&caps[1]).ok().map(|s| s.abs());
                }
            }
        }

        header
    }

    fn records<'a>(&'a self, lines: &'a [TextLine], ctx: RecordContext) -> Records<'a> {
        Box::new(LineRecords::new(self, lines, ctx))
    }
}
