//! Environment abstraction for deterministic testing.
//!
//! Decouples store logic from system resources (wall-clock time, timers,
//! randomness). Production code runs against the OS; tests substitute a clock
//! they can move by hand so expiry paths are exercised without waiting.

use std::time::Duration;

/// Abstract environment providing time, randomness, and async sleeping.
///
/// # Safety
///
/// Implementations MUST guarantee:
///
/// - `random_bytes()` uses cryptographically secure entropy in production
/// - Methods are infallible except in exceptional circumstances (e.g., OS
///   entropy exhaustion)
pub trait Environment: Clone + Send + Sync + 'static {
    /// Seconds since the Unix epoch.
    ///
    /// Used for absolute expiry timestamps, which must stay meaningful across
    /// process restarts (the durable store persists them).
    fn wall_clock_secs(&self) -> u64;

    /// Sleeps for the specified duration.
    ///
    /// The only async method in the trait; used by eviction timers and the
    /// periodic sweep, never on a request path.
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    ///
    /// # Invariants
    ///
    /// - Uses cryptographically secure RNG in production
    fn random_bytes(&self, buffer: &mut [u8]);
}
