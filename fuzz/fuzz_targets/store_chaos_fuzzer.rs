//! Fuzz target for the volatile store under injected failures
//!
//! Drives `MemoryStore` through `ChaoticStore` with arbitrary sequences of
//! stores and receives.
//!
//! # Invariants
//!
//! - No secret is released twice
//! - A released secret is exactly the ciphertext stored under its key
//! - Injected failures never mutate the store, so counters match the
//!   operations that succeeded

#![no_main]

use std::collections::HashMap;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use poof_core::Key;
use poof_server::{ChaoticStore, MemoryStore, SecretStore, StoreConfig};

#[derive(Debug, Arbitrary)]
struct ChaosScenario {
    /// Seed for the ChaoticStore RNG (deterministic failures)
    chaos_seed: u64,
    /// Failure rate 0-9 maps to 0%-90%
    failure_rate_tenth: u8,
    operations: Vec<Operation>,
}

#[derive(Debug, Arbitrary)]
enum Operation {
    Store { payload: u16, hash: u8 },
    Receive { index: u8, hash: u8 },
}

fuzz_target!(|scenario: ChaosScenario| {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap();
    let _guard = runtime.enter();

    let failure_rate = f64::from(scenario.failure_rate_tenth % 10) / 10.0;
    let store = ChaoticStore::with_seed(
        MemoryStore::new(StoreConfig::default()).unwrap(),
        failure_rate,
        scenario.chaos_seed,
    );

    let mut stored: Vec<(Key, String, String)> = Vec::new();
    let mut live: HashMap<Key, (String, String)> = HashMap::new();
    let (mut added, mut burned, mut replaced) = (0u64, 0u64, 0u64);

    for op in scenario.operations.iter().take(256) {
        match op {
            Operation::Store { payload, hash } => {
                let enc = format!("s:i:{payload}");
                let hash = hash.to_string();
                if let Ok(key) = store.set(&enc, &hash, 600) {
                    added += 1;
                    if live.insert(key, (enc.clone(), hash.clone())).is_some() {
                        replaced += 1;
                    }
                    stored.push((key, enc, hash));
                }
            },
            Operation::Receive { index, hash } => {
                if stored.is_empty() {
                    continue;
                }
                let (key, _, right_hash) = &stored[usize::from(*index) % stored.len()];
                let hash = if hash % 4 == 0 { "wrong".to_string() } else { right_hash.clone() };

                if let Ok(Some(enc)) = store.get(key, &hash) {
                    let (expected_enc, expected_hash) =
                        live.remove(key).expect("released a secret that is not live");
                    assert_eq!(enc, expected_enc);
                    assert_eq!(hash, expected_hash);
                    burned += 1;
                }
            },
        }
    }

    let metrics = store.inner().metrics().unwrap();
    assert_eq!(metrics.added, added);
    assert_eq!(metrics.burned, burned);
    assert_eq!(metrics.expired, replaced);
    assert_eq!(metrics.live, live.len() as u64);
});
