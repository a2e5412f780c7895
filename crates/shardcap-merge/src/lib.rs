//! Ordered, first-occurrence-wins merge of per-shard output logs.

mod error;
mod merge;

pub use error::{MergeError, Result};
pub use merge::{MergeStats, merge};
