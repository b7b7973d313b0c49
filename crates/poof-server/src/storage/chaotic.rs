//! Chaotic store wrapper for fault injection testing
//!
//! Store wrapper that randomly fails operations to test error handling. Used
//! for chaos testing to show that a failed operation never partially mutates
//! the store and that the counters still balance afterwards.

#![allow(clippy::disallowed_types, reason = "Locking simple RNG state")]

use std::sync::{
    Mutex,
    atomic::{AtomicUsize, Ordering},
};

use poof_core::Key;

use super::{SecretStore, StoreError, StoreMetrics};

/// Chaotic store wrapper that randomly injects failures
///
/// Delegates to an underlying store but fails `set`, `get` and `metrics`
/// before they reach it, based on a configured failure rate. `close` is
/// always delegated so wrapped stores shut down cleanly.
pub struct ChaoticStore<S: SecretStore> {
    inner: S,
    /// Failure rate (0.0 = never fail, 1.0 = always fail)
    failure_rate: f64,
    /// RNG state for deterministic chaos
    rng: Mutex<ChaoticRng>,
    /// Operation counter
    operation_count: AtomicUsize,
}

/// Simple deterministic RNG for chaos injection
///
/// Uses linear congruential generator (LCG) for fast, deterministic randomness.
/// This ensures chaos tests are reproducible with the same seed.
struct ChaoticRng {
    state: u64,
}

impl ChaoticRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Generate next random value [0.0, 1.0)
    fn next(&mut self) -> f64 {
        // LCG constants from Numerical Recipes
        const A: u64 = 1_664_525;
        const C: u64 = 1_013_904_223;
        const M: u64 = 1u64 << 32;

        self.state = (A.wrapping_mul(self.state).wrapping_add(C)) % M;
        (self.state as f64) / (M as f64)
    }

    /// Check if we should fail (returns true with probability = `failure_rate`)
    fn should_fail(&mut self, failure_rate: f64) -> bool {
        self.next() < failure_rate
    }
}

impl<S: SecretStore> ChaoticStore<S> {
    /// Create a new chaotic store wrapper
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn new(inner: S, failure_rate: f64) -> Self {
        Self::with_seed(inner, failure_rate, 0x1234_5678_9ABC_DEF0)
    }

    /// Create with explicit seed for reproducible chaos
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn with_seed(inner: S, failure_rate: f64, seed: u64) -> Self {
        assert!(
            (0.0..=1.0).contains(&failure_rate),
            "failure_rate must be between 0.0 and 1.0, got {failure_rate}"
        );

        Self {
            inner,
            failure_rate,
            rng: Mutex::new(ChaoticRng::new(seed)),
            operation_count: AtomicUsize::new(0),
        }
    }

    /// Underlying store (for checking invariants after chaos).
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Total number of store operations attempted.
    pub fn operation_count(&self) -> usize {
        self.operation_count.load(Ordering::Relaxed)
    }

    /// Count the operation and decide whether to fail it.
    fn inject(&self) -> Result<(), StoreError> {
        self.operation_count.fetch_add(1, Ordering::Relaxed);

        let fail = match self.rng.lock() {
            Ok(mut rng) => rng.should_fail(self.failure_rate),
            Err(_) => return Err(StoreError::Poisoned),
        };

        if fail { Err(StoreError::Io("chaotic failure injection".to_string())) } else { Ok(()) }
    }
}

impl<S: SecretStore> SecretStore for ChaoticStore<S> {
    fn set(
        &self,
        ciphertext: &str,
        passphrase_hash: &str,
        ttl_secs: u64,
    ) -> Result<Key, StoreError> {
        self.inject()?;
        self.inner.set(ciphertext, passphrase_hash, ttl_secs)
    }

    fn get(&self, key: &Key, passphrase_hash: &str) -> Result<Option<String>, StoreError> {
        self.inject()?;
        self.inner.get(key, passphrase_hash)
    }

    fn metrics(&self) -> Result<StoreMetrics, StoreError> {
        self.inject()?;
        self.inner.metrics()
    }

    fn close(&self) -> Result<(), StoreError> {
        self.operation_count.fetch_add(1, Ordering::Relaxed);
        self.inner.close()
    }
}
