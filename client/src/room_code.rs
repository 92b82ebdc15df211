//! Watch-party room codes.
//!
//! Codes are short, human-shareable, and case-insensitive; the canonical form
//! is uppercase. Normalization happens client-side before any lookup so that
//! `" ab12 "` and `"AB12"` refer to the same room.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Fixed room code length.
pub const CODE_LENGTH: usize = 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoomCodeError {
    #[error("room code is empty")]
    Empty,
    #[error("room code must be {CODE_LENGTH} letters or digits")]
    Malformed,
}

/// Canonical (trimmed, uppercase) room code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomCode(String);

impl RoomCode {
    /// Canonicalize raw user input: trim surrounding whitespace and uppercase.
    /// Idempotent.
    pub fn normalize(input: &str) -> String {
        input.trim().to_ascii_uppercase()
    }

    /// Parse user input into a canonical room code.
    pub fn parse(input: &str) -> Result<Self, RoomCodeError> {
        let normalized = Self::normalize(input);
        if normalized.is_empty() {
            return Err(RoomCodeError::Empty);
        }
        if normalized.len() != CODE_LENGTH
            || !normalized.bytes().all(|b| b.is_ascii_alphanumeric())
        {
            return Err(RoomCodeError::Malformed);
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_trims_and_uppercases() {
        assert_eq!(RoomCode::normalize(" ab12 "), "AB12");
        assert_eq!(RoomCode::normalize("WXYZ"), "WXYZ");
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = RoomCode::normalize(" ab12 ");
        assert_eq!(RoomCode::normalize(&once), once);
    }

    #[test]
    fn parse_accepts_lowercase_and_padding() {
        let padded = RoomCode::parse(" ab12 ").unwrap();
        let canonical = RoomCode::parse("AB12").unwrap();
        assert_eq!(padded, canonical);
        assert_eq!(padded.as_str(), "AB12");
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert_eq!(RoomCode::parse("   "), Err(RoomCodeError::Empty));
        assert_eq!(RoomCode::parse("ABC"), Err(RoomCodeError::Malformed));
        assert_eq!(RoomCode::parse("ABCDE"), Err(RoomCodeError::Malformed));
        assert_eq!(RoomCode::parse("AB!2"), Err(RoomCodeError::Malformed));
    }
}
