//! Phone number normalization and validation.
//!
//! Caller numbers arrive from the telephony platform in E.164 form, but they
//! pass through query strings, form bodies and custom stream parameters on
//! the way, so whitespace, dashes and parentheses are tolerated and stripped.
//! Transfer destinations go through the same normalization before they are
//! dialed.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Canonical E.164: a leading `+`, a non-zero country digit, 7 to 15 digits total.
static E164_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\+[1-9][0-9]{6,14}$").expect("E.164 regex is valid")
});

/// Reasons a phone number is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PhoneValidationError {
    #[error("phone number is empty")]
    Empty,

    #[error("phone number '{0}' is not in E.164 format")]
    NotE164(String),
}

/// Strip everything except digits and prefix a single `+`.
///
/// Returns an empty string for input without any digits.
pub fn clean_e164(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return String::new();
    }
    format!("+{digits}")
}

/// Light normalization for numbers that are expected to already carry a `+`.
///
/// Removes spaces, dashes, dots and parentheses but does not invent a `+`:
/// a number without one fails [`validate_phone_number`].
pub fn normalize_phone_number(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')'))
        .collect()
}

/// Normalize and validate a phone number, returning its canonical form.
pub fn validate_phone_number(raw: &str) -> Result<String, PhoneValidationError> {
    let normalized = normalize_phone_number(raw);
    if normalized.is_empty() {
        return Err(PhoneValidationError::Empty);
    }
    if !E164_REGEX.is_match(&normalized) {
        return Err(PhoneValidationError::NotE164(normalized));
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_e164_strips_formatting() {
        assert_eq!(clean_e164("+1 (415) 555-1234"), "+14155551234");
        assert_eq!(clean_e164("14155551234"), "+14155551234");
        assert_eq!(clean_e164(""), "");
        assert_eq!(clean_e164("abc"), "");
    }

    #[test]
    fn test_validate_accepts_formatted_e164() {
        assert_eq!(
            validate_phone_number(" +1 415-555-1234 ").unwrap(),
            "+14155551234"
        );
        assert_eq!(
            validate_phone_number("+44 (20) 7946.0958").unwrap(),
            "+442079460958"
        );
    }

    #[test]
    fn test_validate_rejects_missing_plus() {
        assert_eq!(
            validate_phone_number("14155551234"),
            Err(PhoneValidationError::NotE164("14155551234".to_string()))
        );
    }

    #[test]
    fn test_validate_rejects_short_and_empty() {
        assert_eq!(validate_phone_number(""), Err(PhoneValidationError::Empty));
        assert_eq!(validate_phone_number("   "), Err(PhoneValidationError::Empty));
        assert!(validate_phone_number("+12345").is_err());
        assert!(validate_phone_number("+0123456789").is_err());
    }

    #[test]
    fn test_validate_rejects_letters() {
        assert!(validate_phone_number("+1415CALLNOW").is_err());
    }
}
