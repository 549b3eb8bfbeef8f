//! Purchase records extracted from documents.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::category::Category;
use super::document::ContentHash;

/// Unit the quantity is expressed in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    #[default]
    Piece,
    /// Weighed produce; quantity is in kilograms.
    Kilogram,
}

impl Unit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Piece => "piece",
            Unit::Kilogram => "kg",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "piece" => Some(Unit::Piece),
            "kg" => Some(Unit::Kilogram),
            _ => None,
        }
    }
}

/// What a line on the document represents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    #[default]
    Product,
    /// Bonus or quantity discount (negative total).
    Discount,
    /// Bottle deposit or packaging surcharge.
    Deposit,
    /// Delivery or service costs.
    Fee,
}

impl LineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineKind::Product => "product",
            LineKind::Discount => "discount",
            LineKind::Deposit => "deposit",
            LineKind::Fee => "fee",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "product" => Some(LineKind::Product),
            "discount" => Some(LineKind::Discount),
            "deposit" => Some(LineKind::Deposit),
            "fee" => Some(LineKind::Fee),
            _ => None,
        }
    }
}

/// Dutch VAT (btw) rates as printed on invoices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VatRate {
    /// Reduced rate: 9% (food).
    #[serde(rename = "9")]
    Reduced9,

    /// Standard rate: 21%.
    #[serde(rename = "21")]
    Standard21,

    /// Zero rate: 0%.
    #[serde(rename = "0")]
    Zero,

    /// Not subject to VAT ("Geen").
    #[serde(rename = "geen")]
    Exempt,
}

impl VatRate {
    /// Get the VAT rate as a decimal multiplier (e.g., 0.21 for 21%).
    pub fn as_decimal(&self) -> Decimal {
        match self {
            VatRate::Reduced9 => Decimal::new(9, 2),
            VatRate::Standard21 => Decimal::new(21, 2),
            VatRate::Zero | VatRate::Exempt => Decimal::ZERO,
        }
    }

    /// Parse VAT rate from string.
    pub fn from_str(s: &str) -> Option<Self> {
        let s = s.trim().to_lowercase();
        let s = s.trim_end_matches('%');

        match s {
            "9" => Some(VatRate::Reduced9),
            "21" => Some(VatRate::Standard21),
            "0" => Some(VatRate::Zero),
            "geen" => Some(VatRate::Exempt),
            _ => None,
        }
    }

    /// Format for display.
    pub fn display(&self) -> &'static str {
        match self {
            VatRate::Reduced9 => "9%",
            VatRate::Standard21 => "21%",
            VatRate::Zero => "0%",
            VatRate::Exempt => "geen",
        }
    }
}

/// A single purchased line, normalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseRecord {
    /// Document this line came from.
    pub document: ContentHash,

    /// 1-based line number in the extracted text.
    pub line_number: usize,

    /// Product name as printed (multi-line names joined).
    pub product: String,

    /// Normalized lookup key used by the categorizer.
    pub product_key: String,

    pub quantity: Decimal,

    pub unit: Unit,

    pub unit_price: Decimal,

    /// Line total including VAT.
    pub total: Decimal,

    pub purchase_date: NaiveDate,

    pub category: Category,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,

    pub line_kind: LineKind,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub vat_rate: Option<VatRate>,
}

impl PurchaseRecord {
    /// `quantity × unit_price`, rounded to cents.
    pub fn computed_total(&self) -> Decimal {
        (self.quantity * self.unit_price).round_dp(2)
    }

    /// Whether `quantity × unit_price` reproduces `total` within `tolerance`.
    pub fn reconciles(&self, tolerance: Decimal) -> bool {
        (self.quantity * self.unit_price - self.total).abs() <= tolerance
    }
}

/// Normalize a printed product name.
///
/// Collapses whitespace, drops the receipt bonus marker (trailing ` B`) and the
/// `BONUS` prefix/suffix so that bonus and regular purchases share a key.
pub fn normalize_product_name(raw: &str) -> String {
    let mut name = raw.split_whitespace().collect::<Vec<_>>().join(" ");

    if name.len() > 2 && name.ends_with(" B") {
        name.truncate(name.len() - 2);
    }

    let upper = name.to_uppercase();
    if upper.ends_with(" BONUS") {
        name.truncate(name.len() - " BONUS".len());
    }
    if upper.starts_with("BONUS ") && name.len() > "BONUS ".len() {
        name = name["BONUS ".len()..].to_string();
    }

    name.trim().trim_start_matches('+').trim().to_string()
}

/// Lookup key for a product name: normalized and lowercased.
pub fn product_key(raw: &str) -> String {
    normalize_product_name(raw).to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_normalize_product_name() {
        assert_eq!(normalize_product_name("  AH  Halfvolle   melk "), "AH Halfvolle melk");
        assert_eq!(normalize_product_name("LEFFE BLOND B"), "LEFFE BLOND");
        assert_eq!(normalize_product_name("AH Cola BONUS"), "AH Cola");
        assert_eq!(normalize_product_name("BONUS AH COLA"), "AH COLA");
        assert_eq!(normalize_product_name("+STATIEGELD"), "STATIEGELD");
        assert_eq!(normalize_product_name("BONUS"), "BONUS");
    }

    #[test]
    fn test_product_key() {
        assert_eq!(product_key("AH Cola BONUS"), "ah cola");
        assert_eq!(product_key("BONUS AH COLA"), product_key("AH Cola"));
    }

    #[test]
    fn test_vat_rate_parsing() {
        assert_eq!(VatRate::from_str("9%"), Some(VatRate::Reduced9));
        assert_eq!(VatRate::from_str("21"), Some(VatRate::Standard21));
        assert_eq!(VatRate::from_str("Geen"), Some(VatRate::Exempt));
        assert_eq!(VatRate::from_str("6%"), None);
        assert_eq!(VatRate::Standard21.as_decimal(), Decimal::new(21, 2));
    }

    #[test]
    fn test_reconciles() {
        let record = PurchaseRecord {
            document: ContentHash::of(b"doc"),
            line_number: 1,
            product: "TROSTOMAAT".to_string(),
            product_key: "trostomaat".to_string(),
            quantity: Decimal::from_str("0.962").unwrap(),
            unit: Unit::Kilogram,
            unit_price: Decimal::from_str("2.38").unwrap(),
            total: Decimal::from_str("2.29").unwrap(),
            purchase_date: NaiveDate::from_ymd_opt(2025, 12, 20).unwrap(),
            category: Category::uncategorized(),
            subcategory: None,
            line_kind: LineKind::Product,
            vat_rate: None,
        };

        assert!(record.reconciles(Decimal::new(1, 2)));
        assert_eq!(record.computed_total(), Decimal::from_str("2.29").unwrap());

        let off = PurchaseRecord {
            total: Decimal::from_str("2.50").unwrap(),
            ..record
        };
        assert!(!off.reconciles(Decimal::new(1, 2)));
    }
}
