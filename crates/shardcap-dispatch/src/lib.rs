//! Bounded-concurrency shard dispatcher.
//!
//! One dispatcher drains one shard against one inference endpoint under two
//! independent constraints: a hard local bound `W` on outstanding requests
//! (semaphore permits held for the life of an attempt) and an optional
//! remote admission ceiling `Q` on the endpoint's self-reported queue depth.
//! Failed attempts retry per item up to the configured limit; permanently
//! failed items are recorded and never abort the shard. Successes append to
//! the output logs immediately and accumulate in the run's checkpoint set,
//! which is flushed durably every checkpoint interval — the resume contract.

mod config;
mod dispatcher;
mod endpoint;
mod error;
mod report;
mod task;
mod writer;

pub use config::DispatchConfig;
pub use dispatcher::ShardDispatcher;
pub use endpoint::{AttemptError, AudioBytes, AudioSource, CaptionEndpoint, Endpoint, FileAudioSource};
pub use error::{DispatchError, Result};
pub use report::DispatchReport;
pub use task::ItemState;
pub use writer::OutputWriter;
