//! Identifier and label normalisation

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Upper-cases and strips diacritics, so `líder` and `LIDER` compare equal.
#[must_use]
pub fn fold(value: &str) -> String {
    value
        .trim()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_uppercase()
}

/// Keeps only ASCII digits.
#[must_use]
pub fn digits(value: &str) -> String {
    value.chars().filter(char::is_ascii_digit).collect()
}

/// Case-insensitive identifier equality after trimming both sides.
#[must_use]
pub fn same_id(a: &str, b: &str) -> bool {
    a.trim().to_uppercase() == b.trim().to_uppercase()
}
