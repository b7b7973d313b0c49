//! Request validation for the send/receive API.
//!
//! The store accepts whatever it is given; every business rule (TTL bounds,
//! hash shape, ciphertext framing) is enforced here before a store is called.
//! Validation collects every failing rule rather than stopping at the first,
//! so a client sees all problems with a request at once.

use thiserror::Error;

use crate::Key;

/// Shortest TTL a secret may be stored with.
pub const MIN_TTL_SECS: u64 = 60;

/// Longest TTL a secret may be stored with (7 days).
pub const MAX_TTL_SECS: u64 = 7 * 86_400;

/// Length of a base64url-encoded SHA-256 digest without padding.
pub const HASH_LEN: usize = 43;

/// Number of `:`-separated parts in a client ciphertext.
pub const ENC_PARTS: usize = 3;

/// A single failed validation rule.
///
/// The `Display` text is what clients receive in the `errors` array.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    /// `enc` missing or empty
    #[error("`enc` was empty")]
    EmptyEnc,

    /// `enc` is not three `:`-separated parts
    #[error("`enc` is not correctly formatted")]
    MalformedEnc,

    /// `hash` missing or empty
    #[error("`hash` was empty")]
    EmptyHash,

    /// `hash` has the wrong length for an unpadded base64url SHA-256
    #[error("`hash` does not look like a base64url encoded SHA256 hash (without padding)")]
    MalformedHash,

    /// `ttl` missing or empty
    #[error("`ttl` was empty")]
    EmptyTtl,

    /// `ttl` does not parse as an integer
    #[error("`ttl` was not an integer")]
    TtlNotInteger,

    /// `ttl` below [`MIN_TTL_SECS`]
    #[error("`ttl` was less than 1 minute")]
    TtlTooShort,

    /// `ttl` above [`MAX_TTL_SECS`]
    #[error("`ttl` was greater than 7 days")]
    TtlTooLong,

    /// `key` missing or empty
    #[error("`key` was empty")]
    EmptyKey,

    /// `key` is not a base64url-encoded key of the right width
    #[error("`key` invalid")]
    InvalidKey,
}

/// A send request that passed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidSend<'a> {
    /// Opaque client ciphertext
    pub enc: &'a str,
    /// Opaque passphrase hash
    pub hash: &'a str,
    /// Time to live in seconds, within `[MIN_TTL_SECS, MAX_TTL_SECS]`
    pub ttl_secs: u64,
}

/// A receive request that passed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidRecv<'a> {
    /// Decoded key
    pub key: Key,
    /// Opaque passphrase hash
    pub hash: &'a str,
}

/// Validate the raw form fields of a send request.
pub fn validate_send<'a>(
    enc: &'a str,
    hash: &'a str,
    ttl: &str,
) -> Result<ValidSend<'a>, Vec<ValidationError>> {
    let mut errors = Vec::new();

    if enc.is_empty() {
        errors.push(ValidationError::EmptyEnc);
    } else if enc.split(':').count() != ENC_PARTS {
        errors.push(ValidationError::MalformedEnc);
    }

    if hash.is_empty() {
        errors.push(ValidationError::EmptyHash);
    } else if hash.len() != HASH_LEN {
        errors.push(ValidationError::MalformedHash);
    }

    let ttl_secs = match parse_ttl(ttl) {
        Ok(ttl_secs) => ttl_secs,
        Err(e) => {
            errors.push(e);
            0
        },
    };

    if errors.is_empty() { Ok(ValidSend { enc, hash, ttl_secs }) } else { Err(errors) }
}

/// Validate the raw form fields of a receive request.
pub fn validate_recv<'a>(key: &str, hash: &'a str) -> Result<ValidRecv<'a>, Vec<ValidationError>> {
    let mut errors = Vec::new();

    let decoded = if key.is_empty() {
        errors.push(ValidationError::EmptyKey);
        None
    } else {
        match Key::from_base64(key) {
            Ok(k) => Some(k),
            Err(_) => {
                errors.push(ValidationError::InvalidKey);
                None
            },
        }
    };

    if hash.is_empty() {
        errors.push(ValidationError::EmptyHash);
    }

    match decoded {
        Some(key) if errors.is_empty() => Ok(ValidRecv { key, hash }),
        _ => Err(errors),
    }
}

fn parse_ttl(ttl: &str) -> Result<u64, ValidationError> {
    if ttl.is_empty() {
        return Err(ValidationError::EmptyTtl);
    }

    let parsed: i64 = ttl.parse().map_err(|_| ValidationError::TtlNotInteger)?;

    if parsed < MIN_TTL_SECS as i64 {
        Err(ValidationError::TtlTooShort)
    } else if parsed > MAX_TTL_SECS as i64 {
        Err(ValidationError::TtlTooLong)
    } else {
        Ok(parsed as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KEY_SIZE;

    const HASH: &str = "0123456789012345678901234567890123456789012";

    #[test]
    fn accepts_well_formed_send() {
        let valid = validate_send("salt:iv:data", HASH, "3600").unwrap();

        assert_eq!(valid.enc, "salt:iv:data");
        assert_eq!(valid.hash, HASH);
        assert_eq!(valid.ttl_secs, 3600);
    }

    #[test]
    fn ttl_bounds_are_inclusive() {
        assert_eq!(validate_send("a:b:c", HASH, "60").unwrap().ttl_secs, MIN_TTL_SECS);
        assert_eq!(validate_send("a:b:c", HASH, "604800").unwrap().ttl_secs, MAX_TTL_SECS);
        assert_eq!(validate_send("a:b:c", HASH, "59"), Err(vec![ValidationError::TtlTooShort]));
        assert_eq!(validate_send("a:b:c", HASH, "604801"), Err(vec![ValidationError::TtlTooLong]));
    }

    #[test]
    fn negative_ttl_is_too_short() {
        assert_eq!(validate_send("a:b:c", HASH, "-5"), Err(vec![ValidationError::TtlTooShort]));
    }

    #[test]
    fn collects_every_failure() {
        let errors = validate_send("", "", "").unwrap_err();

        assert_eq!(
            errors,
            vec![ValidationError::EmptyEnc, ValidationError::EmptyHash, ValidationError::EmptyTtl]
        );
    }

    #[test]
    fn rejects_wrong_enc_framing_and_hash_length() {
        let errors = validate_send("only:two", "short", "sixty").unwrap_err();

        assert_eq!(
            errors,
            vec![
                ValidationError::MalformedEnc,
                ValidationError::MalformedHash,
                ValidationError::TtlNotInteger
            ]
        );
    }

    #[test]
    fn recv_decodes_key() {
        let key = Key::from_bytes([3u8; KEY_SIZE]);
        let valid = validate_recv(&key.to_base64(), HASH).unwrap();

        assert_eq!(valid.key, key);
        assert_eq!(valid.hash, HASH);
    }

    #[test]
    fn recv_reports_empty_and_invalid_fields() {
        assert_eq!(
            validate_recv("", ""),
            Err(vec![ValidationError::EmptyKey, ValidationError::EmptyHash])
        );
        assert_eq!(validate_recv("not base64!", HASH), Err(vec![ValidationError::InvalidKey]));
    }

    #[test]
    fn error_text_matches_api_messages() {
        assert_eq!(ValidationError::EmptyEnc.to_string(), "`enc` was empty");
        assert_eq!(ValidationError::InvalidKey.to_string(), "`key` invalid");
        assert_eq!(ValidationError::TtlTooLong.to_string(), "`ttl` was greater than 7 days");
    }
}
