//! Redb-backed durable store.
//!
//! Uses Redb's ACID transactions with Copy-on-Write for crash safety. The
//! seed, every live secret and the counters survive restarts, so keys handed
//! out before a restart still resolve afterwards.
//!
//! Redb serializes write transactions. Each mutation (insert, release, sweep)
//! is one write transaction that also updates the counters it affects, so a
//! release is a single atomic delete-and-return and counters never drift from
//! the rows they describe.

#![allow(clippy::disallowed_types, reason = "Short synchronous critical sections only")]

use std::{
    path::Path,
    sync::{Arc, Mutex, RwLock},
};

use poof_core::{Environment, KEY_SIZE, Key, Seed};
use redb::{
    Database, ReadableTable, ReadableTableMetadata, TableDefinition, WriteTransaction,
};
use serde::{Deserialize, Serialize};
use tokio::{runtime::Handle, task::AbortHandle};

use super::{SecretStore, StoreConfig, StoreError, StoreMetrics};
use crate::SystemEnv;

/// Table: items
/// Key: secret key [32 bytes]
/// Value: CBOR-encoded StoredSecret
const ITEMS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("items");

/// Table: expiry
/// Key: (expiry_secs: u64 BE, secret key) [40 bytes]
/// Value: empty
///
/// Ordered by expiry so a sweep is a single range scan.
const EXPIRY: TableDefinition<&[u8], &[u8]> = TableDefinition::new("expiry");

/// Table: meta
/// Key: name ("seed")
/// Value: base64url-encoded seed
const META: TableDefinition<&str, &str> = TableDefinition::new("meta");

/// Table: counters
/// Key: counter name ("added", "expired", "burned")
/// Value: count
const COUNTERS: TableDefinition<&str, u64> = TableDefinition::new("counters");

const SEED: &str = "seed";
const ADDED: &str = "added";
const EXPIRED: &str = "expired";
const BURNED: &str = "burned";

const EMPTY: &[u8] = &[];

/// A secret as persisted in the ITEMS table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct StoredSecret {
    /// Opaque client ciphertext
    enc: String,
    /// Opaque passphrase hash
    hash: String,
    /// Unix timestamp (seconds) after which the secret is dead
    expiry_secs: u64,
}

/// Durable store backed by Redb.
///
/// A background task sweeps expired rows every `sweep_interval`, starting
/// immediately on open. Reads of expired-but-unswept rows are caught at
/// release time and counted as expired.
pub struct RedbStore<E: Environment = SystemEnv> {
    inner: Arc<RedbStoreInner<E>>,
    sweeper: Mutex<Option<AbortHandle>>,
}

struct RedbStoreInner<E: Environment> {
    /// `None` once the store is closed; dropping the database releases the
    /// file lock.
    db: RwLock<Option<Database>>,
    seed: Seed,
    config: StoreConfig,
    env: E,
}

impl RedbStore<SystemEnv> {
    /// Open or create a store at the given path using the system environment.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` if the database cannot be opened or created,
    /// `StoreError::Corrupt` if the persisted seed is unreadable, and
    /// `StoreError::Runtime` outside a Tokio runtime.
    pub fn open(path: impl AsRef<Path>, config: StoreConfig) -> Result<Self, StoreError> {
        Self::open_with_env(path, SystemEnv::new(), config)
    }
}

impl<E: Environment> RedbStore<E> {
    /// Open or create a store with an explicit environment.
    ///
    /// Creates tables if they don't exist. On first use a fresh seed is
    /// generated and persisted; afterwards the persisted seed is loaded.
    pub fn open_with_env(
        path: impl AsRef<Path>,
        env: E,
        config: StoreConfig,
    ) -> Result<Self, StoreError> {
        let runtime = Handle::try_current().map_err(|e| StoreError::Runtime(e.to_string()))?;

        let db = Database::create(path.as_ref()).map_err(|e| StoreError::Io(e.to_string()))?;
        let seed = init_db(&db, &env)?;

        let inner = Arc::new(RedbStoreInner { db: RwLock::new(Some(db)), seed, config, env });
        let sweeper = spawn_sweeper(&runtime, Arc::clone(&inner));

        tracing::info!(path = %path.as_ref().display(), "Durable store opened");

        Ok(Self { inner, sweeper: Mutex::new(Some(sweeper)) })
    }

    /// Delete every row whose expiry has passed.
    ///
    /// Returns the number of rows removed, which is also added to the
    /// `expired` counter.
    pub fn sweep(&self) -> Result<u64, StoreError> {
        self.inner.sweep()
    }

    fn stop_sweeper(&self) {
        if let Some(handle) = self.sweeper.lock().ok().and_then(|mut sweeper| sweeper.take()) {
            handle.abort();
        }
    }
}

/// Create tables and load (or generate and persist) the seed.
fn init_db<E: Environment>(db: &Database, env: &E) -> Result<Seed, StoreError> {
    let txn = db.begin_write().map_err(|e| StoreError::Io(e.to_string()))?;

    let seed = {
        let _ = txn.open_table(ITEMS).map_err(|e| StoreError::Io(e.to_string()))?;
        let _ = txn.open_table(EXPIRY).map_err(|e| StoreError::Io(e.to_string()))?;
        let _ = txn.open_table(COUNTERS).map_err(|e| StoreError::Io(e.to_string()))?;

        let mut meta = txn.open_table(META).map_err(|e| StoreError::Io(e.to_string()))?;
        let existing = meta
            .get(SEED)
            .map_err(|e| StoreError::Io(e.to_string()))?
            .map(|value| value.value().to_string());

        match existing {
            Some(encoded) => {
                Seed::from_base64(&encoded).map_err(|e| StoreError::Corrupt(e.to_string()))?
            },
            None => {
                let seed = Seed::generate(env);
                meta.insert(SEED, seed.to_base64().as_str())
                    .map_err(|e| StoreError::Io(e.to_string()))?;
                tracing::info!("Generated new store seed");
                seed
            },
        }
    };

    txn.commit().map_err(|e| StoreError::Io(e.to_string()))?;

    Ok(seed)
}

fn spawn_sweeper<E: Environment>(runtime: &Handle, inner: Arc<RedbStoreInner<E>>) -> AbortHandle {
    runtime
        .spawn(async move {
            let interval = inner.config.sweep_interval;
            loop {
                // Sweep first so expired rows left by a previous run go at once.
                // Commits fsync, so the sweep runs on the blocking pool.
                let sweeping = Arc::clone(&inner);
                match tokio::task::spawn_blocking(move || sweeping.sweep()).await {
                    Ok(Ok(0)) => {},
                    Ok(Ok(removed)) => tracing::debug!(removed, "Swept expired secrets"),
                    Ok(Err(StoreError::Closed)) => break,
                    Ok(Err(e)) => tracing::warn!("Expiry sweep failed: {}", e),
                    Err(e) => tracing::warn!("Expiry sweep task failed: {}", e),
                }
                inner.env.sleep(interval).await;
            }
        })
        .abort_handle()
}

impl<E: Environment> RedbStoreInner<E> {
    /// Run `f` against the open database, or fail with `Closed`.
    fn with_db<T>(
        &self,
        f: impl FnOnce(&Database) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let db = self.db.read().map_err(|_| StoreError::Poisoned)?;
        match db.as_ref() {
            Some(db) => f(db),
            None => Err(StoreError::Closed),
        }
    }

    fn sweep(&self) -> Result<u64, StoreError> {
        let now = self.env.wall_clock_secs();

        self.with_db(|db| {
            let txn = db.begin_write().map_err(|e| StoreError::Io(e.to_string()))?;

            let removed = {
                let mut expiry =
                    txn.open_table(EXPIRY).map_err(|e| StoreError::Io(e.to_string()))?;
                let mut items = txn.open_table(ITEMS).map_err(|e| StoreError::Io(e.to_string()))?;

                // Everything strictly before `now` is dead
                let upper = encode_expiry_key(now, &Key::from_bytes([0u8; KEY_SIZE]));
                let mut doomed = Vec::new();
                for result in
                    expiry.range(..upper.as_slice()).map_err(|e| StoreError::Io(e.to_string()))?
                {
                    let (index_key, _) = result.map_err(|e| StoreError::Io(e.to_string()))?;
                    doomed.push(decode_expiry_key(index_key.value())?);
                }

                for (expiry_secs, key) in &doomed {
                    expiry
                        .remove(encode_expiry_key(*expiry_secs, key).as_slice())
                        .map_err(|e| StoreError::Io(e.to_string()))?;
                    items
                        .remove(key.as_bytes().as_slice())
                        .map_err(|e| StoreError::Io(e.to_string()))?;
                }

                doomed.len() as u64
            };

            if removed == 0 {
                txn.abort().map_err(|e| StoreError::Io(e.to_string()))?;
                return Ok(0);
            }

            bump_counter(&txn, EXPIRED, removed)?;
            txn.commit().map_err(|e| StoreError::Io(e.to_string()))?;

            Ok(removed)
        })
    }

    fn set(&self, ciphertext: &str, passphrase_hash: &str, ttl_secs: u64) -> Result<Key, StoreError> {
        let key = self.seed.derive_key(ciphertext);
        let secret = StoredSecret {
            enc: ciphertext.to_owned(),
            hash: passphrase_hash.to_owned(),
            expiry_secs: self.env.wall_clock_secs().saturating_add(ttl_secs),
        };
        let value = encode_secret(&secret)?;

        self.with_db(|db| {
            let txn = db.begin_write().map_err(|e| StoreError::Io(e.to_string()))?;

            let displaced = {
                let mut items = txn.open_table(ITEMS).map_err(|e| StoreError::Io(e.to_string()))?;

                let live = items.len().map_err(|e| StoreError::Io(e.to_string()))?;
                if self.config.is_full(live) {
                    return Err(StoreError::AtCapacity { capacity: self.config.capacity });
                }

                let previous = items
                    .insert(key.as_bytes().as_slice(), value.as_slice())
                    .map_err(|e| StoreError::Io(e.to_string()))?
                    .map(|old| decode_secret(old.value()))
                    .transpose()?;

                let mut expiry =
                    txn.open_table(EXPIRY).map_err(|e| StoreError::Io(e.to_string()))?;
                if let Some(previous) = &previous {
                    expiry
                        .remove(encode_expiry_key(previous.expiry_secs, &key).as_slice())
                        .map_err(|e| StoreError::Io(e.to_string()))?;
                }
                expiry
                    .insert(encode_expiry_key(secret.expiry_secs, &key).as_slice(), EMPTY)
                    .map_err(|e| StoreError::Io(e.to_string()))?;

                previous.is_some()
            };

            bump_counter(&txn, ADDED, 1)?;
            if displaced {
                // Identical ciphertext: last write wins, the old row counts as
                // expired so the counters still balance.
                bump_counter(&txn, EXPIRED, 1)?;
                tracing::warn!(%key, "Secret replaced by identical ciphertext");
            }

            txn.commit().map_err(|e| StoreError::Io(e.to_string()))?;

            tracing::debug!(%key, ttl_secs, "Secret stored");
            Ok(key)
        })
    }

    fn get(&self, key: &Key, passphrase_hash: &str) -> Result<Option<String>, StoreError> {
        let now = self.env.wall_clock_secs();

        self.with_db(|db| {
            let txn = db.begin_write().map_err(|e| StoreError::Io(e.to_string()))?;

            let released = {
                let mut items = txn.open_table(ITEMS).map_err(|e| StoreError::Io(e.to_string()))?;

                let stored = items
                    .get(key.as_bytes().as_slice())
                    .map_err(|e| StoreError::Io(e.to_string()))?
                    .map(|value| decode_secret(value.value()))
                    .transpose()?;

                match stored {
                    Some(secret) if secret.hash == passphrase_hash => {
                        items
                            .remove(key.as_bytes().as_slice())
                            .map_err(|e| StoreError::Io(e.to_string()))?;
                        let mut expiry =
                            txn.open_table(EXPIRY).map_err(|e| StoreError::Io(e.to_string()))?;
                        expiry
                            .remove(encode_expiry_key(secret.expiry_secs, key).as_slice())
                            .map_err(|e| StoreError::Io(e.to_string()))?;
                        Some(secret)
                    },
                    // Unknown key or wrong hash: nothing changes
                    _ => None,
                }
            };

            let Some(secret) = released else {
                txn.abort().map_err(|e| StoreError::Io(e.to_string()))?;
                return Ok(None);
            };

            // The row is gone either way. A row past its expiry was already
            // dead; the sweep just had not reached it.
            let outcome = if now > secret.expiry_secs {
                bump_counter(&txn, EXPIRED, 1)?;
                tracing::debug!(%key, "Expired secret removed on read");
                None
            } else {
                bump_counter(&txn, BURNED, 1)?;
                tracing::debug!(%key, "Secret burned");
                Some(secret.enc)
            };

            txn.commit().map_err(|e| StoreError::Io(e.to_string()))?;

            Ok(outcome)
        })
    }

    fn metrics(&self) -> Result<StoreMetrics, StoreError> {
        self.with_db(|db| {
            let txn = db.begin_read().map_err(|e| StoreError::Io(e.to_string()))?;

            let items = txn.open_table(ITEMS).map_err(|e| StoreError::Io(e.to_string()))?;
            let counters = txn.open_table(COUNTERS).map_err(|e| StoreError::Io(e.to_string()))?;

            let read = |name: &str| -> Result<u64, StoreError> {
                Ok(counters
                    .get(name)
                    .map_err(|e| StoreError::Io(e.to_string()))?
                    .map_or(0, |value| value.value()))
            };

            Ok(StoreMetrics {
                live: items.len().map_err(|e| StoreError::Io(e.to_string()))?,
                added: read(ADDED)?,
                expired: read(EXPIRED)?,
                burned: read(BURNED)?,
            })
        })
    }

    /// Drop the database handle. Later operations see `Closed`.
    fn release(&self) -> Result<(), StoreError> {
        let mut db = self.db.write().map_err(|_| StoreError::Poisoned)?;
        db.take();
        Ok(())
    }
}

impl<E: Environment> SecretStore for RedbStore<E> {
    fn set(
        &self,
        ciphertext: &str,
        passphrase_hash: &str,
        ttl_secs: u64,
    ) -> Result<Key, StoreError> {
        debug_assert!(ttl_secs > 0);
        self.inner.set(ciphertext, passphrase_hash, ttl_secs)
    }

    fn get(&self, key: &Key, passphrase_hash: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key, passphrase_hash)
    }

    fn metrics(&self) -> Result<StoreMetrics, StoreError> {
        self.inner.metrics()
    }

    fn close(&self) -> Result<(), StoreError> {
        self.stop_sweeper();

        // Best effort: a failed final sweep leaves rows for the next start
        match self.inner.sweep() {
            Ok(removed) => tracing::debug!(removed, "Final sweep before close"),
            Err(StoreError::Closed) => return Ok(()),
            Err(e) => tracing::warn!("Final sweep failed: {}", e),
        }

        self.inner.release()?;
        tracing::info!("Durable store closed");
        Ok(())
    }
}

impl<E: Environment> Drop for RedbStore<E> {
    fn drop(&mut self) {
        self.stop_sweeper();

        // An aborted sweeper may still hold the inner state until the runtime
        // polls it again; the file lock must not wait for that.
        if let Err(e) = self.inner.release() {
            tracing::warn!("Failed to release durable store on drop: {}", e);
        }
    }
}

/// Add `by` to a named counter inside an open write transaction.
fn bump_counter(txn: &WriteTransaction, name: &str, by: u64) -> Result<(), StoreError> {
    let mut counters = txn.open_table(COUNTERS).map_err(|e| StoreError::Io(e.to_string()))?;

    let current = counters
        .get(name)
        .map_err(|e| StoreError::Io(e.to_string()))?
        .map_or(0, |value| value.value());

    counters
        .insert(name, current.saturating_add(by))
        .map_err(|e| StoreError::Io(e.to_string()))?;

    Ok(())
}

fn encode_secret(secret: &StoredSecret) -> Result<Vec<u8>, StoreError> {
    let mut bytes = Vec::new();
    ciborium::into_writer(secret, &mut bytes)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(bytes)
}

fn decode_secret(bytes: &[u8]) -> Result<StoredSecret, StoreError> {
    ciborium::from_reader(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Encode (expiry_secs, key) as a 40-byte index key.
///
/// Layout: [expiry_secs: 8 bytes BE][key: 32 bytes]
/// Lexicographic ordering matches expiry ordering.
fn encode_expiry_key(expiry_secs: u64, key: &Key) -> [u8; 8 + KEY_SIZE] {
    let mut index_key = [0u8; 8 + KEY_SIZE];
    index_key[..8].copy_from_slice(&expiry_secs.to_be_bytes());
    index_key[8..].copy_from_slice(key.as_bytes());
    index_key
}

/// Decode an expiry index key back to (expiry_secs, key).
fn decode_expiry_key(index_key: &[u8]) -> Result<(u64, Key), StoreError> {
    if index_key.len() != 8 + KEY_SIZE {
        return Err(StoreError::Corrupt(format!(
            "expiry index key has {} bytes, expected {}",
            index_key.len(),
            8 + KEY_SIZE
        )));
    }

    let mut expiry = [0u8; 8];
    expiry.copy_from_slice(&index_key[..8]);
    let key = Key::try_from(&index_key[8..]).map_err(|e| StoreError::Corrupt(e.to_string()))?;

    Ok((u64::from_be_bytes(expiry), key))
}
