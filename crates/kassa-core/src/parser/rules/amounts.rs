//! Amount and quantity parsing for Dutch receipts and invoices.

use rust_decimal::Decimal;
use std::str::FromStr;

use super::patterns::AMOUNT_PATTERN;

/// Parse a Dutch-formatted amount (e.g. "1,29", "1.29", "1.234,56", "-0,50" or "0,50-").
pub fn parse_dutch_amount(s: &str) -> Option<Decimal> {
    let s = s.trim();
    let negative = s.starts_with('-') || s.ends_with('-');

    let cleaned: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect();

    // Replace comma with period for decimal
    let normalized = if cleaned.contains(',') && !cleaned.contains('.') {
        cleaned.replace(',', ".")
    } else if cleaned.contains(',') && cleaned.contains('.') {
        // Whichever separator comes last is the decimal one
        match (cleaned.rfind(','), cleaned.rfind('.')) {
            (Some(c), Some(d)) if c > d => cleaned.replace('.', "").replace(',', "."),
            (Some(_), Some(_)) => cleaned.replace(',', ""),
            _ => cleaned,
        }
    } else {
        cleaned
    };

    let amount = Decimal::from_str(&normalized).ok()?;
    Some(if negative { -amount } else { amount })
}

/// Parse a quantity: whole pieces ("2") or a weight ("0.962", "0,962").
pub fn parse_quantity(s: &str) -> Option<Decimal> {
    Decimal::from_str(&s.trim().replace(',', ".")).ok()
}

/// Whether the text contains anything that looks like a money amount.
pub fn has_amount(text: &str) -> bool {
    AMOUNT_PATTERN.is_match(text)
}

/// Format amount in Dutch style (€ 1.234,56).
pub fn format_euro(amount: Decimal) -> String {
    let s = format!("{:.2}", amount.abs().round_dp(2));
    let (integer, fraction) = s.split_once('.').unwrap_or((s.as_str(), "00"));

    let mut grouped = String::new();
    for (i, c) in integer.chars().enumerate() {
        if i > 0 && (integer.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }

    let sign = if amount.is_sign_negative() && !amount.is_zero() { "-" } else { "" };
    format!("{}€ {},{}", sign, grouped, fraction)
}
