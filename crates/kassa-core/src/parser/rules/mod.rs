//! Field-level rules shared by the receipt and invoice layouts.

pub mod amounts;
pub mod dates;
pub mod patterns;

pub use amounts::{format_euro, has_amount, parse_dutch_amount, parse_quantity};
pub use dates::{find_long_date, find_numeric_date, parse_dutch_date};
