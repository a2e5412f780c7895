use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Stable identifier for one unit of work.
///
/// Manifest-backed datasets use the utterance id from the manifest line;
/// index-range datasets use the decimal row index. Keys never change across
/// retries, resubmissions, or merges — the checkpoint set and the merger
/// both dedup on them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemKey(String);

impl ItemKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Key for an item addressed by row index in a columnar store.
    pub fn from_index(index: u64) -> Self {
        Self(index.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ItemKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ItemKey {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Where the audio payload for an item lives.
///
/// The payload is a reference, never materialized audio — the dispatcher
/// loads bytes lazily, once per attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemPayload {
    /// Audio file on a filesystem the dispatcher can read.
    AudioPath(PathBuf),
    /// Row index into an externally managed columnar store.
    RowIndex(u64),
}

/// One unit of work: a stable key plus an immutable payload reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub key: ItemKey,
    pub payload: ItemPayload,
}

impl WorkItem {
    pub fn new(key: ItemKey, payload: ItemPayload) -> Self {
        Self { key, payload }
    }
}
