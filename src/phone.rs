/// Phone number normalisation
///
/// The formatted phone number is the user's primary key, so every entry point
/// that accepts a phone runs it through [`format_phone`] first.
use crate::error::{PocketError, PocketResult};

/// Normalise a user-entered phone number
///
/// Whitespace is removed. Numbers already carrying a `+` country prefix are
/// kept as-is (8 to 15 digits after the `+`); bare 10-digit numbers get
/// `default_country_code` prepended.
pub fn format_phone(raw: &str, default_country_code: &str) -> PocketResult<String> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();

    if compact.is_empty() {
        return Err(PocketError::Validation("Phone number is required".to_string()));
    }

    if let Some(digits) = compact.strip_prefix('+') {
        if !(8..=15).contains(&digits.len()) || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(PocketError::Validation(
                "Please enter a valid phone number".to_string(),
            ));
        }
        return Ok(compact);
    }

    if compact.len() != 10 || !compact.chars().all(|c| c.is_ascii_digit()) {
        return Err(PocketError::Validation(
            "Please enter a valid 10-digit phone number".to_string(),
        ));
    }

    Ok(format!("{}{}", default_country_code, compact))
}
