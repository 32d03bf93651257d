//! Carrier tracking number validation.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Thailand Post, Kerry and Flash numbers: carrier prefix then at least
    /// eight uppercase alphanumerics.
    static ref TRACKING_NUMBER: Regex = Regex::new(r"^(TH|KERRY|FLASH)[0-9A-Z]{8,}$")
        .expect("tracking number pattern must compile");
}

/// Trim and uppercase `raw`, returning it when it is a recognised carrier
/// tracking number.
pub fn normalize_tracking_number(raw: &str) -> Option<String> {
    let candidate = raw.trim().to_uppercase();
    TRACKING_NUMBER.is_match(&candidate).then_some(candidate)
}
