//! Regex patterns for Albert Heijn receipts and invoices.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Amounts (Dutch format: 1,29 or 1.29, thousands as 1.234,56)
    pub static ref AMOUNT_PATTERN: Regex = Regex::new(
        r"-?\d{1,3}(?:\.?\d{3})*[,.]\d{2}\b-?"
    ).unwrap();

    // Dates
    pub static ref DATE_DMY: Regex = Regex::new(
        r"\b(\d{1,2})[./\-](\d{1,2})[./\-](\d{4})\b"
    ).unwrap();

    pub static ref DATE_DUTCH_LONG: Regex = Regex::new(
        r"(?i)\b(\d{1,2})\s+(januari|februari|maart|april|mei|juni|juli|augustus|september|oktober|november|december)\s+(\d{4})\b"
    ).unwrap();

    // Receipt (kassabon) item shapes
    pub static ref RECEIPT_WEIGHED: Regex = Regex::new(
        r"(?i)^(\d+[.,]\d+)\s*KG\s+(.+?)\s+(\d+[.,]\d{2})\s+(\d+[.,]\d{2})$"
    ).unwrap();

    pub static ref RECEIPT_QTY_UNIT_TOTAL: Regex = Regex::new(
        r"^(\d+)\s+(.+?)\s+(-?\d+[.,]\d{2})\s+(-?\d+[.,]\d{2})$"
    ).unwrap();

    pub static ref RECEIPT_NAME_QTY_UNIT_TOTAL: Regex = Regex::new(
        r"^(.+?)\s+(\d+)\s+(-?\d+[.,]\d{2})\s+(-?\d+[.,]\d{2})$"
    ).unwrap();

    pub static ref RECEIPT_QTY_TOTAL: Regex = Regex::new(
        r"^(\d+)\s+(.+?)\s+(-?\d+[.,]\d{2})$"
    ).unwrap();

    pub static ref RECEIPT_SURCHARGE: Regex = Regex::new(
        r"^\+\s*(.+?)\s+(-?\d+[.,]\d{2})$"
    ).unwrap();

    pub static ref RECEIPT_NAME_TOTAL: Regex = Regex::new(
        r"^(.+?)\s+(-?\d+[.,]\d{2}-?)$"
    ).unwrap();

    // Receipt header
    pub static ref RECEIPT_NUMBER: Regex = Regex::new(
        r"^(\d{4})$"
    ).unwrap();

    pub static ref RECEIPT_TOTAL: Regex = Regex::new(
        r"(?i)^TOTAAL\s*:?\s+(-?\d+[.,]\d{2})"
    ).unwrap();

    pub static ref RECEIPT_SAVINGS: Regex = Regex::new(
        r"(?i)^UW VOORDEEL\s*:?\s+(-?\d+[.,]\d{2})"
    ).unwrap();

    // Invoice (online order) item shape:
    // Name Qty Btw% Excl BtwAmount Incl
    pub static ref INVOICE_ITEM: Regex = Regex::new(
        r"(?i)^(.+?)\s+(\d+)\s+(9\s?%|21\s?%|0\s?%|Geen)\s+(-?\d+[.,]\d{2})\s+(-?\d+[.,]\d{2})\s+(-?\d+[.,]\d{2})$"
    ).unwrap();

    // Invoice header
    pub static ref INVOICE_NUMBER: Regex = Regex::new(
        r"(?i)Factuurnummer\s*:?\s*([A-Za-z0-9\-/]+)"
    ).unwrap();

    pub static ref INVOICE_DATE: Regex = Regex::new(
        r"(?i)^(?:factuur)?datum\s*:?\s*(.+)$"
    ).unwrap();

    pub static ref INVOICE_TOTAL: Regex = Regex::new(
        r"(?i)Totaal\s+inclusief\s+btw\s*:?\s*(-?\d{1,3}(?:\.?\d{3})*[,.]\d{2})"
    ).unwrap();

    pub static ref INVOICE_SAVINGS: Regex = Regex::new(
        r"(?i)Uw\s+voordeel\s*:?\s*(-?\d{1,3}(?:\.?\d{3})*[,.]\d{2})"
    ).unwrap();
}
