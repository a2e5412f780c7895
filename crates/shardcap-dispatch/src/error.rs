#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Invalid dispatcher configuration")]
    Configuration,

    #[error("Shard contains no items")]
    EmptyShard,

    #[error("Endpoint not reachable within startup deadline")]
    EndpointUnreachable,

    #[error("Checkpoint store failure")]
    Checkpoint,

    #[error("Output log I/O failure")]
    OutputIo,

    #[error("Dispatch worker panicked")]
    WorkerPanic,
}

pub type Result<T, E = error_stack::Report<DispatchError>> = std::result::Result<T, E>;
