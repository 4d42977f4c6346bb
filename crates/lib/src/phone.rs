//! Phone identifier normalization.
//!
//! Raw phone numbers arrive from the messaging channel in many shapes ("55 1234 5678",
//! "(55) 1234-5678", "+52 1 55..."). Every cache key and remote comparison uses the
//! normalized form, so the same raw input must always produce the same identifier.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical phone identifier: `+` followed by country code and subscriber number.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhoneIdentifier(String);

impl PhoneIdentifier {
    /// Wrap an already-normalized value. Normalizer implementations use this to build their output.
    pub fn from_normalized(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhoneIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PhoneIdentifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Strategy that turns a raw phone number into a [`PhoneIdentifier`].
///
/// Implementations must be total (every input yields an identifier) and idempotent:
/// normalizing an identifier's string again returns the same identifier.
pub trait PhoneNormalizer: Send + Sync {
    fn normalize(&self, raw: &str) -> PhoneIdentifier;
}

/// Mexican numbering heuristic: country code 52, mobile numbers carrying the legacy `1` prefix.
///
/// Not a numbering-plan parser. Rules are applied in order and the first match wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct MxMobileNormalizer;

const MOBILE_PREFIX: &str = "521";
const COUNTRY_PREFIX: &str = "52";

impl PhoneNormalizer for MxMobileNormalizer {
    fn normalize(&self, raw: &str) -> PhoneIdentifier {
        let cleaned: String = raw
            .chars()
            .filter(|c| !c.is_whitespace() && !matches!(c, '-' | '(' | ')'))
            .collect();

        if cleaned.starts_with('+') {
            return PhoneIdentifier(cleaned);
        }
        if cleaned.starts_with(MOBILE_PREFIX) {
            return PhoneIdentifier(format!("+{}", cleaned));
        }
        if cleaned.starts_with(COUNTRY_PREFIX) {
            return PhoneIdentifier(format!("+{}", cleaned));
        }
        let all_digits = !cleaned.is_empty() && cleaned.chars().all(|c| c.is_ascii_digit());
        if all_digits && cleaned.len() == 10 {
            return PhoneIdentifier(format!("+{}{}", MOBILE_PREFIX, cleaned));
        }
        // Shadowed by the `52` rule above.
        if all_digits && cleaned.len() == 12 && cleaned.starts_with(COUNTRY_PREFIX) {
            return PhoneIdentifier(format!("+{}", cleaned));
        }
        PhoneIdentifier(format!("+{}", cleaned))
    }
}

/// Normalize with the default strategy.
pub fn normalize(raw: &str) -> PhoneIdentifier {
    MxMobileNormalizer.normalize(raw)
}
