use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum PartitionError {
    #[error("Manifest not found: {}", .0.display())]
    MissingManifest(PathBuf),

    #[error("Failed to read manifest: {}", .0.display())]
    ReadManifest(PathBuf),

    #[error("Dataset is empty")]
    EmptyDataset,

    #[error("Invalid index range [{start}, {end})")]
    InvalidRange { start: u64, end: u64 },

    #[error("Pipe-command manifest sources are not supported: {0}")]
    PipeSource(String),
}

pub type Result<T, E = error_stack::Report<PartitionError>> = std::result::Result<T, E>;
