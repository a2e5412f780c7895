//! Deterministic dataset partitioning and manifest loading.
//!
//! `partition` splits an item count into contiguous half-open shards whose
//! boundaries are byte-identical for identical inputs — shard identifiers
//! derive from those boundaries, and resume across resubmissions depends on
//! them being reproducible. `Manifest` loads the line-oriented `wav.scp`
//! dataset description the caption clients consume.

mod error;
mod manifest;
mod partition;

pub use error::{PartitionError, Result};
pub use manifest::{Manifest, ManifestEntry};
pub use partition::{partition, range_shard_id, shard_id};
