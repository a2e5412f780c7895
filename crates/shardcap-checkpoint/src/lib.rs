//! Durable, append-only, idempotent record of succeeded item keys per run.
//!
//! The checkpoint set is the resume contract: a dispatcher restarted with
//! the same `run_id` loads the set and skips every key in it. The set only
//! grows; `put` of a present key is a no-op; a crash mid-write discards at
//! most the incomplete trailing entry.

pub mod compliance;
mod error;
mod file;
mod in_memory;
mod store;

pub use error::{CheckpointError, Result};
pub use file::FileCheckpointStore;
pub use in_memory::InMemoryCheckpointStore;
pub use store::CheckpointStore;
