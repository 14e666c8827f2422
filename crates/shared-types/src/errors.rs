//! # Error Types
//!
//! Parse errors for the primitive types in `entities`.

use thiserror::Error;

/// Errors produced while parsing an address from text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressParseError {
    /// The input was empty (or only whitespace).
    #[error("Address is empty")]
    Empty,

    /// The input had the wrong number of hex digits.
    #[error("Address must be 40 hex characters, got {0}")]
    InvalidLength(usize),

    /// The input contained non-hex characters.
    #[error("Address contains invalid hex: {0}")]
    InvalidHex(String),
}

/// Errors produced while parsing a 32-byte hash from text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HashParseError {
    /// The input had the wrong number of hex digits.
    #[error("Hash must be 64 hex characters, got {0}")]
    InvalidLength(usize),

    /// The input contained non-hex characters.
    #[error("Hash contains invalid hex: {0}")]
    InvalidHex(String),
}
