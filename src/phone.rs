//! Phone numbers as E.164 strings
//!
//! Carriers and config files format numbers differently, so the driver number
//! and every inbound `From` go through [`normalize_phone`] before comparison.

/// A bare North American number, country code omitted
const NANP_LOCAL_DIGITS: usize = 10;

pub fn normalize_phone(raw: &str) -> String {
    let raw = raw.trim();
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();

    match (raw.starts_with('+'), digits.len()) {
        (false, NANP_LOCAL_DIGITS) => format!("+1{}", digits),
        _ => format!("+{}", digits),
    }
}

/// Whether an inbound sender is `expected`. A sender with no digits never matches.
pub fn same_number(from: &str, expected: &str) -> bool {
    let from = normalize_phone(from);
    from.len() > 1 && from == normalize_phone(expected)
}
