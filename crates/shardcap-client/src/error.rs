use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to send request")]
    Send,

    #[error("Request timed out")]
    Timeout,

    #[error("Failed to read response")]
    Recv,

    #[error("Endpoint returned status {0}")]
    Status(u16),

    #[error("Malformed caption response")]
    MalformedResponse,

    #[error("Failed to load audio: {}", .0.display())]
    Audio(PathBuf),

    #[error("Endpoint not reachable within startup deadline")]
    Unreachable,
}

pub type Result<T, E = error_stack::Report<ClientError>> = std::result::Result<T, E>;
