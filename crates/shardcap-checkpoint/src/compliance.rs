//! Compliance test suite for `CheckpointStore` implementations.
//!
//! Any implementation must pass every test here; backends run the whole
//! suite from their own test module:
//!
//! ```ignore
//! #[tokio::test]
//! async fn my_store_compliance() {
//!     CheckpointComplianceTests::run_all_isolated(|| async {
//!         MyStore::open(...).unwrap()
//!     })
//!     .await;
//! }
//! ```

use std::future::Future;

use shardcap_core::ItemKey;

use crate::CheckpointStore;

/// Compliance test suite for `CheckpointStore` implementations.
pub struct CheckpointComplianceTests;

impl CheckpointComplianceTests {
    /// Run every test, creating a fresh store per test for isolation.
    pub async fn run_all_isolated<S, F, Fut>(mut factory: F)
    where
        S: CheckpointStore,
        F: FnMut() -> Fut,
        Fut: Future<Output = S>,
    {
        Self::test_put_then_contains(&factory().await).await;
        Self::test_put_is_idempotent(&factory().await).await;
        Self::test_load_reflects_puts(&factory().await).await;
        Self::test_set_only_grows(&factory().await).await;
        Self::test_flush_is_repeatable(&factory().await).await;
    }

    pub async fn test_put_then_contains<S: CheckpointStore>(store: &S) {
        let key = ItemKey::new("compliance-a");
        assert!(!store.contains(&key).await.unwrap());
        store.put(&key).await.unwrap();
        assert!(store.contains(&key).await.unwrap());
    }

    pub async fn test_put_is_idempotent<S: CheckpointStore>(store: &S) {
        let key = ItemKey::new("compliance-dup");
        store.put(&key).await.unwrap();
        store.put(&key).await.unwrap();
        store.put(&key).await.unwrap();
        store.flush().await.unwrap();

        let keys = store.load().await.unwrap();
        assert_eq!(keys.iter().filter(|k| **k == key).count(), 1);
    }

    pub async fn test_load_reflects_puts<S: CheckpointStore>(store: &S) {
        let keys: Vec<ItemKey> = (0..16).map(|i| ItemKey::new(format!("k-{i:03}"))).collect();
        for key in &keys {
            store.put(key).await.unwrap();
        }
        store.flush().await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.len(), keys.len());
        for key in &keys {
            assert!(loaded.contains(key), "missing {key}");
        }
    }

    pub async fn test_set_only_grows<S: CheckpointStore>(store: &S) {
        store.put(&ItemKey::new("early")).await.unwrap();
        store.flush().await.unwrap();
        let before = store.load().await.unwrap();

        store.put(&ItemKey::new("later")).await.unwrap();
        store.flush().await.unwrap();
        let after = store.load().await.unwrap();

        assert!(before.is_subset(&after), "checkpoint set shrank");
        assert!(after.contains(&ItemKey::new("later")));
    }

    pub async fn test_flush_is_repeatable<S: CheckpointStore>(store: &S) {
        store.put(&ItemKey::new("flushed")).await.unwrap();
        store.flush().await.unwrap();
        store.flush().await.unwrap();
        assert!(store.contains(&ItemKey::new("flushed")).await.unwrap());
    }
}
