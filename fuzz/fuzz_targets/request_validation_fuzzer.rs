//! Fuzz target for request validation
//!
//! Feeds arbitrary form fields to the send and receive validators to find:
//! - Panics on odd UTF-8 or huge integers in `ttl`
//! - Accepted requests that break the documented bounds
//! - Keys that decode but do not re-encode to the same text
//!
//! The fuzzer should NEVER panic. All invalid inputs should return errors.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use poof_core::{
    Key,
    validate::{ENC_PARTS, HASH_LEN, MAX_TTL_SECS, MIN_TTL_SECS, validate_recv, validate_send},
};

#[derive(Debug, Arbitrary)]
struct Request<'a> {
    enc: &'a str,
    hash: &'a str,
    ttl: &'a str,
    key: &'a str,
}

fuzz_target!(|request: Request<'_>| {
    match validate_send(request.enc, request.hash, request.ttl) {
        Ok(valid) => {
            assert_eq!(valid.enc.split(':').count(), ENC_PARTS);
            assert_eq!(valid.hash.len(), HASH_LEN);
            assert!((MIN_TTL_SECS..=MAX_TTL_SECS).contains(&valid.ttl_secs));
        },
        Err(errors) => assert!(!errors.is_empty()),
    }

    if let Ok(valid) = validate_recv(request.key, request.hash) {
        assert!(!valid.hash.is_empty());
        assert_eq!(Key::from_base64(&valid.key.to_base64()), Ok(valid.key));
    }
});
