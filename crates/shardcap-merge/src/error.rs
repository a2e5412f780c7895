use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("input file not found: {0}")]
    MissingInput(PathBuf),
    #[error("failed to read input: {0}")]
    ReadInput(PathBuf),
    #[error("failed to write output: {0}")]
    WriteOutput(PathBuf),
}

pub type Result<T, E = error_stack::Report<MergeError>> = std::result::Result<T, E>;
