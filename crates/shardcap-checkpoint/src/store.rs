use std::collections::HashSet;

use futures::future::BoxFuture;
use shardcap_core::ItemKey;

use crate::Result;

/// Append-only, idempotent set of succeeded item keys for one run.
///
/// Implementations must uphold:
/// - `put` of an already-present key is a no-op (insertion is idempotent);
/// - the set only grows: no operation removes a key;
/// - after `flush` returns, every prior `put` survives process restart;
/// - `load` after a crash reproduces every entry whose write completed,
///   discarding an incomplete trailing write without corrupting the rest.
///
/// Any checkpoint I/O failure is fatal to the caller: ignoring one risks
/// silently losing completed work.
pub trait CheckpointStore: Send + Sync {
    /// Record `key` as succeeded. Idempotent.
    fn put(&self, key: &ItemKey) -> BoxFuture<'_, Result<()>>;

    /// Whether `key` has been recorded as succeeded.
    fn contains(&self, key: &ItemKey) -> BoxFuture<'_, Result<bool>>;

    /// Reconstruct the full checkpoint set from durable storage.
    fn load(&self) -> BoxFuture<'_, Result<HashSet<ItemKey>>>;

    /// Make every prior `put` durable.
    fn flush(&self) -> BoxFuture<'_, Result<()>>;
}
