//! Bank name resolution for seller payout accounts.

/// Map a Thai bank display name, or an already-valid brand code, to the
/// gateway's bank brand code.
pub fn bank_brand(name: &str) -> Option<&'static str> {
    let name = name.trim();
    let brand = match name {
        "กสิกรไทย" | "ธนาคารกสิกรไทย" => "kbank",
        "ไทยพาณิชย์" | "ธนาคารไทยพาณิชย์" => "scb",
        "กรุงเทพ" | "ธนาคารกรุงเทพ" => "bbl",
        "กรุงศรี" | "กรุงศรีอยุธยา" | "ธนาคารกรุงศรีอยุธยา" => "bay",
        "กรุงไทย" | "ธนาคารกรุงไทย" => "ktb",
        other => match other.to_ascii_lowercase().as_str() {
            "kbank" => "kbank",
            "scb" => "scb",
            "bbl" => "bbl",
            "bay" => "bay",
            "ktb" => "ktb",
            _ => return None,
        },
    };
    Some(brand)
}
