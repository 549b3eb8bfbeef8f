//! Date extraction for Dutch receipts and invoices.

use chrono::NaiveDate;

use super::patterns::{DATE_DMY, DATE_DUTCH_LONG};

/// Find the first `dd-mm-yyyy` (or `dd.mm.yyyy`, `dd/mm/yyyy`) date in the text.
pub fn find_numeric_date(text: &str) -> Option<NaiveDate> {
    DATE_DMY.captures_iter(text).find_map(|caps| {
        let day: u32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let year: i32 = caps[3].parse().ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    })
}

/// Find the first long Dutch date ("14 december 2025") in the text.
pub fn find_long_date(text: &str) -> Option<NaiveDate> {
    DATE_DUTCH_LONG.captures_iter(text).find_map(|caps| {
        let day: u32 = caps[1].parse().ok()?;
        let month = dutch_month_to_number(&caps[2])?;
        let year: i32 = caps[3].parse().ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    })
}

/// Parse a date written either way.
pub fn parse_dutch_date(text: &str) -> Option<NaiveDate> {
    find_long_date(text).or_else(|| find_numeric_date(text))
}

fn dutch_month_to_number(month: &str) -> Option<u32> {
    let number = match month.to_lowercase().as_str() {
        "januari" => 1,
        "februari" => 2,
        "maart" => 3,
        "april" => 4,
        "mei" => 5,
        "juni" => 6,
        "juli" => 7,
        "augustus" => 8,
        "september" => 9,
        "oktober" => 10,
        "november" => 11,
        "december" => 12,
        _ => return None,
    };
    Some(number)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_date_after_time() {
        assert_eq!(
            find_numeric_date("14:26 20-12-2025"),
            NaiveDate::from_ymd_opt(2025, 12, 20)
        );
    }

    #[test]
    fn test_numeric_date_skips_invalid() {
        assert_eq!(
            find_numeric_date("99-99-2025 en 01.02.2024"),
            NaiveDate::from_ymd_opt(2024, 2, 1)
        );
    }

    #[test]
    fn test_long_date() {
        assert_eq!(
            find_long_date("Datum 14 December 2025"),
            NaiveDate::from_ymd_opt(2025, 12, 14)
        );
        assert_eq!(find_long_date("14 dec 2025"), None);
    }

    #[test]
    fn test_parse_dutch_date_either_form() {
        assert_eq!(parse_dutch_date("3 mei 2024"), NaiveDate::from_ymd_opt(2024, 5, 3));
        assert_eq!(parse_dutch_date("03-05-2024"), NaiveDate::from_ymd_opt(2024, 5, 3));
        assert_eq!(parse_dutch_date("geen datum"), None);
    }
}
