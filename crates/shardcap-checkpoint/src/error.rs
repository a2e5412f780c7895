#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("Checkpoint store initialization error")]
    Initialization,

    #[error("Checkpoint I/O error")]
    Io,

    #[error("Checkpoint serialization error")]
    Serialization,
}

pub type Result<T, E = error_stack::Report<CheckpointError>> = std::result::Result<T, E>;
