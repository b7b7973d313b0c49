//! Property tests for key derivation and request validation.

use poof_core::{
    KEY_SIZE, Key, SEED_SIZE, Seed,
    validate::{MAX_TTL_SECS, MIN_TTL_SECS, ValidationError, validate_recv, validate_send},
};
use proptest::prelude::*;

proptest! {
    #[test]
    fn prop_derived_key_survives_wire_encoding(
        seed in prop::collection::vec(any::<u8>(), SEED_SIZE),
        ciphertext in ".*",
    ) {
        let seed = Seed::from_bytes(seed);
        let key = seed.derive_key(&ciphertext);

        // ORACLE: The text form handed to clients decodes back to the same key
        let decoded: Key = key.to_string().parse().expect("wire form decodes");
        prop_assert_eq!(decoded, key);
    }

    #[test]
    fn prop_distinct_ciphertexts_get_distinct_keys(
        seed in prop::collection::vec(any::<u8>(), SEED_SIZE),
        a in ".{1,64}",
        b in ".{1,64}",
    ) {
        prop_assume!(a != b);
        let seed = Seed::from_bytes(seed);

        prop_assert_ne!(seed.derive_key(&a), seed.derive_key(&b));
    }

    #[test]
    fn prop_valid_keys_pass_recv_validation(bytes in prop::array::uniform32(any::<u8>())) {
        let key = Key::from_bytes(bytes);
        let valid = validate_recv(&key.to_base64(), "h").expect("valid recv");

        prop_assert_eq!(valid.key, key);
    }

    #[test]
    fn prop_ttl_validation_matches_bounds(ttl in -1_000i64..1_000_000) {
        let result = validate_send("a:b:c", "0123456789012345678901234567890123456789012", &ttl.to_string());

        if ttl < MIN_TTL_SECS as i64 {
            prop_assert_eq!(result, Err(vec![ValidationError::TtlTooShort]));
        } else if ttl > MAX_TTL_SECS as i64 {
            prop_assert_eq!(result, Err(vec![ValidationError::TtlTooLong]));
        } else {
            prop_assert_eq!(result.map(|v| v.ttl_secs), Ok(ttl as u64));
        }
    }
}

#[test]
fn key_width_matches_digest() {
    let seed = Seed::from_bytes(vec![0u8; SEED_SIZE]);

    assert_eq!(seed.derive_key("").as_bytes().len(), KEY_SIZE);
}
