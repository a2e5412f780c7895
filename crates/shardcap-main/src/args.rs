pub mod logging;

pub use logging::{LogLevel, init_tracing};
