pub mod args;
mod cli;
mod dispatch;
mod error;
mod merge;
mod partition;

pub use cli::Cli;
pub use error::*;
