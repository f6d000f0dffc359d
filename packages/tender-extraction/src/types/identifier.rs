//! Tender identifiers - validated tokens used to build request URLs.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// Portal identifier grammar: `<buyer>-<sequence>-<type tag><number>`,
/// e.g. `1234-567-L123`, `2390-28-LE23`.
static RE_TENDER_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]{1,10}-[0-9]{1,6}-[A-Z][A-Z0-9]{0,2}[0-9]{1,6}$")
        .expect("tender identifier regex is valid")
});

/// A tender identifier that passed grammar validation.
///
/// Construction is the only validation point; everything downstream of
/// [`TenderIdentifier::parse`] can assume a well-formed token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenderIdentifier(String);

/// Rejected identifier input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidIdentifier {
    pub input: String,
}

impl fmt::Display for InvalidIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' does not match the tender identifier format XXXX-XXX-LXXX",
            self.input
        )
    }
}

impl std::error::Error for InvalidIdentifier {}

impl TenderIdentifier {
    /// Validate a raw token. Surrounding whitespace is ignored.
    pub fn parse(raw: &str) -> Result<Self, InvalidIdentifier> {
        let trimmed = raw.trim();
        if RE_TENDER_ID.is_match(trimmed) {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(InvalidIdentifier {
                input: raw.to_string(),
            })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for TenderIdentifier {
    type Err = InvalidIdentifier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TenderIdentifier {
    type Error = InvalidIdentifier;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TenderIdentifier> for String {
    fn from(id: TenderIdentifier) -> Self {
        id.0
    }
}

impl AsRef<str> for TenderIdentifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenderIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_accepts_portal_formats() {
        for raw in ["1234-567-L123", "2390-28-LE23", "1509-5-L114", "750301-54-LP21"] {
            assert!(TenderIdentifier::parse(raw).is_ok(), "rejected {}", raw);
        }
    }

    #[test]
    fn test_rejects_malformed() {
        for raw in ["bad id", "", "1234-567", "1234-567-123", "1234-567-l123", "1234 567 L123"] {
            assert!(TenderIdentifier::parse(raw).is_err(), "accepted {:?}", raw);
        }
    }

    #[test]
    fn test_trims_whitespace() {
        let id = TenderIdentifier::parse("  1234-567-L123\n").unwrap();
        assert_eq!(id.as_str(), "1234-567-L123");
    }

    #[test]
    fn test_serde_validates() {
        let id: TenderIdentifier = serde_json::from_str("\"1234-567-L123\"").unwrap();
        assert_eq!(id.to_string(), "1234-567-L123");

        let bad: Result<TenderIdentifier, _> = serde_json::from_str("\"bad id\"");
        assert!(bad.is_err());
    }

    proptest! {
        #[test]
        fn prop_generated_ids_are_accepted(
            buyer in 0u32..10_000_000,
            seq in 0u32..100_000,
            tag in "[A-Z][A-Z0-9]{0,1}",
            num in 0u32..100_000,
        ) {
            let raw = format!("{}-{}-{}{}", buyer, seq, tag, num);
            prop_assert!(TenderIdentifier::parse(&raw).is_ok());
        }

        #[test]
        fn prop_whitespace_inside_is_rejected(raw in "[0-9]{1,4} [0-9]{1,3}-L[0-9]{1,3}") {
            prop_assert!(TenderIdentifier::parse(&raw).is_err());
        }
    }
}
