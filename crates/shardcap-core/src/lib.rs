//! Shared data model for the shardcap caption-harvest engine.
//!
//! This crate holds the types every other crate agrees on: item keys and
//! work items, shard ranges, and the output/error record formats written by
//! the dispatcher and consumed by the merger. It performs no I/O.

mod item;
mod records;
mod shard;

pub use item::{ItemKey, ItemPayload, WorkItem};
pub use records::{ErrorRecord, OutputRecord};
pub use shard::Shard;
