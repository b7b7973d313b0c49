//! Shared helpers for store integration tests.

#![allow(dead_code)]

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use poof_core::Environment;

/// Environment whose wall clock only moves when a test advances it.
///
/// Sleeps are real Tokio sleeps, so eviction timers still fire; only the
/// absolute clock used for persisted expiry timestamps is manual.
#[derive(Clone, Debug)]
pub struct ManualEnv {
    now: Arc<AtomicU64>,
}

impl ManualEnv {
    pub fn new(start_secs: u64) -> Self {
        Self { now: Arc::new(AtomicU64::new(start_secs)) }
    }

    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Environment for ManualEnv {
    fn wall_clock_secs(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        // Fixed pattern: tests need reproducible seeds, not secret ones
        for (i, byte) in buffer.iter_mut().enumerate() {
            *byte = i as u8;
        }
    }
}

/// A ciphertext in the `salt:iv:data` shape the API accepts.
pub fn ciphertext(n: usize) -> String {
    format!("salt{n}:iv{n}:data{n}")
}
