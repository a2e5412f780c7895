use std::collections::HashSet;

use futures::future::{BoxFuture, FutureExt as _};
use shardcap_core::ItemKey;
use tokio::sync::RwLock;

use crate::{CheckpointStore, Result};

/// In-memory checkpoint store for tests and dry runs.
///
/// Upholds the idempotence and monotonicity contract but provides no
/// durability: "flush" is a no-op and the set dies with the process.
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    keys: RwLock<HashSet<ItemKey>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for InMemoryCheckpointStore {
    fn put(&self, key: &ItemKey) -> BoxFuture<'_, Result<()>> {
        let key = key.clone();
        async move {
            self.keys.write().await.insert(key);
            Ok(())
        }
        .boxed()
    }

    fn contains(&self, key: &ItemKey) -> BoxFuture<'_, Result<bool>> {
        let key = key.clone();
        async move { Ok(self.keys.read().await.contains(&key)) }.boxed()
    }

    fn load(&self) -> BoxFuture<'_, Result<HashSet<ItemKey>>> {
        async move { Ok(self.keys.read().await.clone()) }.boxed()
    }

    fn flush(&self) -> BoxFuture<'_, Result<()>> {
        async move { Ok(()) }.boxed()
    }
}
