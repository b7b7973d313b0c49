//! Error types for key handling.

use thiserror::Error;

/// Errors that can occur when decoding a key or seed from its text form.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// Input is not valid URL-safe base64 (without padding)
    #[error("invalid base64url encoding: {0}")]
    InvalidEncoding(String),

    /// Decoded bytes have the wrong width
    #[error("invalid length: expected {expected} bytes, got {got}")]
    InvalidLength {
        /// Required number of bytes
        expected: usize,
        /// Number of bytes actually decoded
        got: usize,
    },
}

impl From<base64::DecodeError> for KeyError {
    fn from(err: base64::DecodeError) -> Self {
        KeyError::InvalidEncoding(err.to_string())
    }
}
