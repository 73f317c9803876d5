//! The opaque unit code printed on every ticket.
//!
//! A [`UnitCode`] is a lookup key and nothing more: it carries no signature,
//! no price and no identity. Scanned input is normalized before lookup so
//! that `ab12-cd` and `AB12CD` resolve to the same unit.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Shortest code accepted at lookup time.
pub const MIN_CODE_LEN: usize = 4;

/// Longest code accepted at lookup time.
pub const MAX_CODE_LEN: usize = 32;

/// Rejection of scanned input that cannot be a unit code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnitCodeError {
    /// Length outside `MIN_CODE_LEN..=MAX_CODE_LEN` after normalization.
    #[error("unit code must be {MIN_CODE_LEN}..={MAX_CODE_LEN} characters, got {0}")]
    Length(usize),

    /// A character outside `[A-Z0-9]`.
    #[error("unit code contains invalid character {0:?}")]
    InvalidCharacter(char),
}

/// Normalized, upper-case alphanumeric unit code.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(transparent)]
#[ts(export, export_to = "bindings/")]
pub struct UnitCode(String);

impl UnitCode {
    /// Normalize and validate scanned or typed input.
    ///
    /// Surrounding whitespace, inner spaces and dashes are removed and
    /// letters are upper-cased.
    pub fn parse(input: &str) -> Result<Self, UnitCodeError> {
        let normalized: String = input
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .map(|c| c.to_ascii_uppercase())
            .collect();

        if let Some(bad) = normalized.chars().find(|c| !c.is_ascii_alphanumeric()) {
            return Err(UnitCodeError::InvalidCharacter(bad));
        }
        let len = normalized.len();
        if !(MIN_CODE_LEN..=MAX_CODE_LEN).contains(&len) {
            return Err(UnitCodeError::Length(len));
        }
        Ok(Self(normalized))
    }

    /// Borrow the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the code, returning the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl core::fmt::Display for UnitCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl core::str::FromStr for UnitCode {
    type Err = UnitCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_separators() {
        let code = UnitCode::parse("  ab12-cd ").ok();
        assert_eq!(code.as_ref().map(UnitCode::as_str), Some("AB12CD"));
    }

    #[test]
    fn rejects_short_input() {
        assert_eq!(UnitCode::parse("A1"), Err(UnitCodeError::Length(2)));
    }

    #[test]
    fn rejects_punctuation() {
        assert_eq!(
            UnitCode::parse("AB12;DROP"),
            Err(UnitCodeError::InvalidCharacter(';'))
        );
    }

    #[test]
    fn rejects_overlong_input() {
        let long = "A".repeat(MAX_CODE_LEN + 1);
        assert!(matches!(UnitCode::parse(&long), Err(UnitCodeError::Length(_))));
    }
}
