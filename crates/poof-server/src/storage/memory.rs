#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]

use std::{
    collections::{HashMap, hash_map::Entry},
    sync::{Arc, RwLock, Weak},
    time::Duration,
};

use poof_core::{Environment, Key, Seed};
use tokio::{runtime::Handle, task::AbortHandle};

use super::{SecretStore, StoreConfig, StoreError, StoreMetrics};
use crate::SystemEnv;

/// Volatile in-memory store.
///
/// One `HashMap` behind one `RwLock` holds every entry together with the
/// counters, so an entry change and the counter describing it happen in the
/// same critical section. Each `set` spawns an eviction timer on the Tokio
/// runtime captured at construction; there is no bulk scan.
///
/// Lookups share the read lock; the destructive step of `get` re-checks the
/// entry under the write lock, so exactly one of several concurrent callers
/// can burn a secret.
///
/// Contents are lost when the process exits. The seed is regenerated on every
/// construction.
pub struct MemoryStore<E: Environment = SystemEnv> {
    inner: Arc<RwLock<MemoryStoreInner>>,
    seed: Seed,
    config: StoreConfig,
    env: E,
    runtime: Handle,
}

struct MemoryStoreInner {
    entries: HashMap<Key, MemoryEntry>,

    /// Distinguishes successive entries stored under the same key, so a stale
    /// timer never evicts a newer entry.
    next_generation: u64,

    added: u64,
    expired: u64,
    burned: u64,

    closed: bool,
}

struct MemoryEntry {
    enc: String,
    hash: String,
    generation: u64,
    eviction: AbortHandle,
}

impl MemoryStore<SystemEnv> {
    /// Create an empty store using the system environment.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Runtime` when called outside a Tokio runtime.
    pub fn new(config: StoreConfig) -> Result<Self, StoreError> {
        Self::with_env(SystemEnv::new(), config)
    }
}

impl<E: Environment> MemoryStore<E> {
    /// Create an empty store with an explicit environment.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Runtime` when called outside a Tokio runtime.
    pub fn with_env(env: E, config: StoreConfig) -> Result<Self, StoreError> {
        let runtime = Handle::try_current().map_err(|e| StoreError::Runtime(e.to_string()))?;

        Ok(Self {
            inner: Arc::new(RwLock::new(MemoryStoreInner {
                entries: HashMap::new(),
                next_generation: 0,
                added: 0,
                expired: 0,
                burned: 0,
                closed: false,
            })),
            seed: Seed::generate(&env),
            config,
            env,
            runtime,
        })
    }

    /// Spawn the timer that expires one entry.
    ///
    /// Holds only a weak reference so a dropped store is not kept alive by
    /// pending timers.
    fn schedule_eviction(&self, key: Key, generation: u64, ttl: Duration) -> AbortHandle {
        let inner = Arc::downgrade(&self.inner);
        let env = self.env.clone();

        self.runtime
            .spawn(async move {
                env.sleep(ttl).await;
                evict(&inner, key, generation);
            })
            .abort_handle()
    }
}

/// Timer callback: remove the entry if it is still the one this timer was
/// scheduled for.
fn evict(inner: &Weak<RwLock<MemoryStoreInner>>, key: Key, generation: u64) {
    let Some(inner) = inner.upgrade() else {
        return;
    };

    let Ok(mut inner) = inner.write() else {
        tracing::warn!(%key, "Eviction skipped: store lock poisoned");
        return;
    };

    match inner.entries.entry(key) {
        Entry::Occupied(entry) if entry.get().generation == generation => {
            entry.remove();
            inner.expired += 1;
            tracing::debug!(%key, "Secret expired");
        },
        _ => {},
    }
}

impl<E: Environment> SecretStore for MemoryStore<E> {
    fn set(
        &self,
        ciphertext: &str,
        passphrase_hash: &str,
        ttl_secs: u64,
    ) -> Result<Key, StoreError> {
        debug_assert!(ttl_secs > 0);

        let key = self.seed.derive_key(ciphertext);
        let mut inner = self.inner.write().map_err(|_| StoreError::Poisoned)?;

        if inner.closed {
            return Err(StoreError::Closed);
        }

        if self.config.is_full(inner.entries.len() as u64) {
            return Err(StoreError::AtCapacity { capacity: self.config.capacity });
        }

        let generation = inner.next_generation;
        inner.next_generation += 1;

        let eviction = self.schedule_eviction(key, generation, Duration::from_secs(ttl_secs));
        let entry = MemoryEntry {
            enc: ciphertext.to_owned(),
            hash: passphrase_hash.to_owned(),
            generation,
            eviction,
        };

        // Identical ciphertext collapses onto one key: last write wins, and the
        // displaced entry is accounted for as expired.
        if let Some(previous) = inner.entries.insert(key, entry) {
            previous.eviction.abort();
            inner.expired += 1;
            tracing::warn!(%key, "Secret replaced by identical ciphertext");
        }
        inner.added += 1;

        tracing::debug!(%key, ttl_secs, "Secret stored");
        Ok(key)
    }

    fn get(&self, key: &Key, passphrase_hash: &str) -> Result<Option<String>, StoreError> {
        {
            let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;

            if inner.closed {
                return Err(StoreError::Closed);
            }

            match inner.entries.get(key) {
                Some(entry) if entry.hash == passphrase_hash => {},
                _ => return Ok(None),
            }
        }

        let mut inner = self.inner.write().map_err(|_| StoreError::Poisoned)?;

        // Another caller may have burned the entry between the two locks.
        let Entry::Occupied(entry) = inner.entries.entry(*key) else {
            return Ok(None);
        };

        if entry.get().hash != passphrase_hash {
            return Ok(None);
        }

        let entry = entry.remove();
        entry.eviction.abort();
        inner.burned += 1;

        tracing::debug!(%key, "Secret burned");
        Ok(Some(entry.enc))
    }

    fn metrics(&self) -> Result<StoreMetrics, StoreError> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;

        Ok(StoreMetrics {
            live: inner.entries.len() as u64,
            added: inner.added,
            expired: inner.expired,
            burned: inner.burned,
        })
    }

    fn close(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.write().map_err(|_| StoreError::Poisoned)?;

        for entry in inner.entries.values() {
            entry.eviction.abort();
        }
        inner.closed = true;

        tracing::info!(live = inner.entries.len(), "Memory store closed");
        Ok(())
    }
}

impl<E: Environment> Drop for MemoryStore<E> {
    fn drop(&mut self) {
        if let Ok(inner) = self.inner.read() {
            for entry in inner.entries.values() {
                entry.eviction.abort();
            }
        }
    }
}
