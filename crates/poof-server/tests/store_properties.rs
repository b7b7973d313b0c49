//! Behavioural tests shared by both store backends.
//!
//! These tests verify the properties the HTTP layer relies on:
//! - A secret is released at most once, even under concurrent receives
//! - A wrong hash never mutates the store
//! - Expired secrets are never released and are counted as expired
//! - Counters balance: `added = burned + expired + live`

mod common;

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

use common::{ManualEnv, ciphertext};
use poof_server::{MemoryStore, RedbStore, SecretStore, StoreConfig, StoreMetrics};
use tempfile::tempdir;

const HASH: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQ";

fn assert_balanced(metrics: StoreMetrics) {
    assert_eq!(
        metrics.added,
        metrics.burned + metrics.expired + metrics.live,
        "counters out of balance: {metrics:?}"
    );
}

/// Race `threads` receivers for one secret and return how many won.
fn race_receivers(store: &Arc<dyn SecretStore>, threads: usize) -> usize {
    let key = store.set("salt:iv:contended", HASH, 60).unwrap();
    let winners = AtomicUsize::new(0);

    thread::scope(|scope| {
        for _ in 0..threads {
            scope.spawn(|| {
                if store.get(&key, HASH).unwrap().is_some() {
                    winners.fetch_add(1, Ordering::SeqCst);
                }
            });
        }
    });

    winners.load(Ordering::SeqCst)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_memory_concurrent_receives_release_once() {
    let store: Arc<dyn SecretStore> = Arc::new(MemoryStore::new(StoreConfig::default()).unwrap());

    for _ in 0..20 {
        assert_eq!(race_receivers(&store, 8), 1);
    }

    let metrics = store.metrics().unwrap();
    assert_eq!(metrics.burned, 20);
    assert_balanced(metrics);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_redb_concurrent_receives_release_once() {
    let dir = tempdir().unwrap();
    let store: Arc<dyn SecretStore> =
        Arc::new(RedbStore::open(dir.path().join("test.redb"), StoreConfig::default()).unwrap());

    for _ in 0..20 {
        assert_eq!(race_receivers(&store, 8), 1);
    }

    let metrics = store.metrics().unwrap();
    assert_eq!(metrics.burned, 20);
    assert_balanced(metrics);

    store.close().unwrap();
}

#[tokio::test]
async fn test_memory_wrong_hash_leaves_secret() {
    let store = MemoryStore::new(StoreConfig::default()).unwrap();
    let key = store.set(&ciphertext(1), HASH, 60).unwrap();

    for _ in 0..5 {
        assert_eq!(store.get(&key, "not-the-hash").unwrap(), None);
    }

    assert_eq!(store.metrics().unwrap(), StoreMetrics { live: 1, added: 1, expired: 0, burned: 0 });
    assert_eq!(store.get(&key, HASH).unwrap(), Some(ciphertext(1)));
}

#[tokio::test]
async fn test_memory_entry_expires_after_ttl() {
    let store = MemoryStore::new(StoreConfig::default()).unwrap();
    let key = store.set(&ciphertext(1), HASH, 1).unwrap();

    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert_eq!(store.get(&key, HASH).unwrap(), None);
    let metrics = store.metrics().unwrap();
    assert_eq!(metrics, StoreMetrics { live: 0, added: 1, expired: 1, burned: 0 });
}

#[tokio::test]
async fn test_memory_burn_cancels_eviction() {
    let store = MemoryStore::new(StoreConfig::default()).unwrap();
    let key = store.set(&ciphertext(1), HASH, 1).unwrap();

    assert!(store.get(&key, HASH).unwrap().is_some());
    tokio::time::sleep(Duration::from_millis(1500)).await;

    // The timer must not count a burned secret a second time
    assert_eq!(store.metrics().unwrap(), StoreMetrics { live: 0, added: 1, expired: 0, burned: 1 });
}

#[tokio::test]
async fn test_memory_replaced_entry_keeps_its_own_timer() {
    let store = MemoryStore::new(StoreConfig::default()).unwrap();

    store.set("salt:iv:same", HASH, 1).unwrap();
    let key = store.set("salt:iv:same", HASH, 60).unwrap();

    // The first entry's timer fires here and must leave the newer entry alone
    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert_eq!(store.get(&key, HASH).unwrap(), Some("salt:iv:same".to_string()));
    assert_balanced(store.metrics().unwrap());
}

#[tokio::test]
async fn test_redb_expired_secret_is_not_released() {
    let dir = tempdir().unwrap();
    let env = ManualEnv::new(1_000_000);
    let config = StoreConfig { sweep_interval: Duration::from_secs(3600), ..StoreConfig::default() };
    let store = RedbStore::open_with_env(dir.path().join("test.redb"), env.clone(), config).unwrap();

    let key = store.set(&ciphertext(1), HASH, 60).unwrap();
    env.advance(61);

    assert_eq!(store.get(&key, HASH).unwrap(), None);
    assert_eq!(store.metrics().unwrap(), StoreMetrics { live: 0, added: 1, expired: 1, burned: 0 });

    store.close().unwrap();
}

#[tokio::test]
async fn test_redb_secret_releasable_until_expiry_passes() {
    let dir = tempdir().unwrap();
    let env = ManualEnv::new(1_000_000);
    let store = RedbStore::open_with_env(
        dir.path().join("test.redb"),
        env.clone(),
        StoreConfig::default(),
    )
    .unwrap();

    let key = store.set(&ciphertext(1), HASH, 60).unwrap();
    env.advance(60);

    assert_eq!(store.get(&key, HASH).unwrap(), Some(ciphertext(1)));

    store.close().unwrap();
}

#[tokio::test]
async fn test_redb_sweep_removes_only_expired() {
    let dir = tempdir().unwrap();
    let env = ManualEnv::new(1_000_000);
    let store = RedbStore::open_with_env(
        dir.path().join("test.redb"),
        env.clone(),
        StoreConfig::default(),
    )
    .unwrap();

    let short: Vec<_> = (0..5).map(|i| store.set(&ciphertext(i), HASH, 60).unwrap()).collect();
    let long: Vec<_> = (5..8).map(|i| store.set(&ciphertext(i), HASH, 3600).unwrap()).collect();

    env.advance(120);
    store.sweep().unwrap();

    let metrics = store.metrics().unwrap();
    assert_eq!(metrics, StoreMetrics { live: 3, added: 8, expired: 5, burned: 0 });

    for key in &short {
        assert_eq!(store.get(key, HASH).unwrap(), None);
    }
    for (key, i) in long.iter().zip(5..) {
        assert_eq!(store.get(key, HASH).unwrap(), Some(ciphertext(i)));
    }

    assert_balanced(store.metrics().unwrap());
    store.close().unwrap();
}

#[tokio::test]
async fn test_redb_capacity_frees_after_burn() {
    let dir = tempdir().unwrap();
    let config = StoreConfig { capacity: 2, ..StoreConfig::default() };
    let store = RedbStore::open(dir.path().join("test.redb"), config).unwrap();

    let first = store.set(&ciphertext(1), HASH, 60).unwrap();
    store.set(&ciphertext(2), HASH, 60).unwrap();
    assert!(store.set(&ciphertext(3), HASH, 60).is_err());

    store.get(&first, HASH).unwrap();

    assert!(store.set(&ciphertext(3), HASH, 60).is_ok());
    store.close().unwrap();
}

#[tokio::test]
async fn test_memory_keys_differ_between_instances() {
    let a = MemoryStore::new(StoreConfig::default()).unwrap();
    let b = MemoryStore::new(StoreConfig::default()).unwrap();

    let key_a = a.set(&ciphertext(1), HASH, 60).unwrap();
    let key_b = b.set(&ciphertext(1), HASH, 60).unwrap();

    assert_ne!(key_a, key_b);
    assert_eq!(b.get(&key_a, HASH).unwrap(), None);
}
