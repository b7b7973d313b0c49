//! Secret store abstraction.
//!
//! Trait-based abstraction over a content-addressed, TTL-bounded,
//! single-release key/value store. Two interchangeable backends implement it:
//!
//! - [`MemoryStore`]: volatile map behind one reader/writer lock, with a
//!   cancellable eviction timer per entry
//! - [`RedbStore`]: durable redb database with a periodic expiry sweep
//!
//! The trait is synchronous (no async) and object safe, so the HTTP layer holds
//! an `Arc<dyn SecretStore>` chosen once at startup.

mod chaotic;
mod error;
mod memory;
mod redb;

use std::time::Duration;

pub use chaotic::ChaoticStore;
pub use error::StoreError;
pub use memory::MemoryStore;
use poof_core::Key;

pub use self::redb::RedbStore;

/// Default interval between expiry sweeps of the durable backend.
///
/// Short relative to the minimum TTL (60 seconds) so expired rows do not
/// linger for long.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10);

/// Default maximum number of live secrets.
pub const DEFAULT_CAPACITY: u64 = 1_048_576;

/// Configuration shared by both backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Maximum number of live secrets; `0` means unlimited.
    ///
    /// Callers should treat the limit as soft. Both backends happen to check
    /// it under the same lock or transaction as the insert, so today it is
    /// never exceeded.
    pub capacity: u64,
    /// Interval between expiry sweeps (durable backend only)
    pub sweep_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { capacity: DEFAULT_CAPACITY, sweep_interval: DEFAULT_SWEEP_INTERVAL }
    }
}

impl StoreConfig {
    /// True if `live` secrets leave no room for another.
    fn is_full(&self, live: u64) -> bool {
        self.capacity > 0 && live >= self.capacity
    }
}

/// Point-in-time counters of a store.
///
/// Eventually consistent with concurrent mutations. `added` always converges
/// to `burned + expired + live`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreMetrics {
    /// Secrets currently stored
    pub live: u64,
    /// Secrets ever accepted by `set`
    pub added: u64,
    /// Secrets removed because their TTL passed
    pub expired: u64,
    /// Secrets released by a successful `get`
    pub burned: u64,
}

/// Content-addressed store that releases each secret at most once.
///
/// Must be Send + Sync (shared by concurrent request handlers) and
/// synchronous. Entries leave the store only by being burned (a successful
/// `get`) or by expiring.
pub trait SecretStore: Send + Sync + 'static {
    /// Store a ciphertext for `ttl_secs` seconds.
    ///
    /// # Invariants
    ///
    /// - Pre: `ttl_secs > 0` (TTL bounds are enforced by the caller)
    /// - Post: on `Ok(key)`, `key = SHA-256(seed || ciphertext)` and `added`
    ///   increased by one
    /// - Returns `StoreError::AtCapacity` without mutating state when full
    fn set(&self, ciphertext: &str, passphrase_hash: &str, ttl_secs: u64)
    -> Result<Key, StoreError>;

    /// Release a secret, destroying it.
    ///
    /// Returns `Ok(None)` for an unknown key, a wrong hash, or an expired
    /// secret; these cases are deliberately indistinguishable. A wrong hash
    /// never mutates the store.
    ///
    /// # Invariants
    ///
    /// - Once this returns `Ok(Some(_))` for a secret, no later call returns it
    ///   again, including concurrent calls
    fn get(&self, key: &Key, passphrase_hash: &str) -> Result<Option<String>, StoreError>;

    /// Snapshot of the store's counters.
    fn metrics(&self) -> Result<StoreMetrics, StoreError>;

    /// Release timers and handles.
    ///
    /// Durable backends run one final expiry sweep first. Operations after
    /// close return `StoreError::Closed`.
    fn close(&self) -> Result<(), StoreError>;
}
