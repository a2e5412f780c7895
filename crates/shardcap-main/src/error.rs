use std::path::PathBuf;

#[derive(Debug, thiserror::Error, Clone)]
pub enum MainError {
    #[error("Missing file: {}", .0.display())]
    MissingFile(PathBuf),
    #[error("Invalid dataset selection")]
    InvalidSelection,
    #[error("Shard index {index} out of range for {shards} shards")]
    ShardOutOfRange { index: usize, shards: usize },
    #[error("Failed to open checkpoint store")]
    OpenCheckpoint,
    #[error("Dispatch failed")]
    Dispatch,
    #[error("{0} items failed permanently")]
    ItemsFailed(usize),
    #[error("Interrupted before the shard completed")]
    Interrupted,
    #[error("Merge failed")]
    Merge,
    #[error("Failed to initialize tracing")]
    TracingInit,
}

pub type Result<T, E = error_stack::Report<MainError>> = std::result::Result<T, E>;
