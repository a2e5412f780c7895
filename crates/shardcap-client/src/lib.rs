//! HTTP client for the caption inference endpoint.
//!
//! Speaks the OpenAI-style `/chat/completions` route with the audio payload
//! inlined as a base64 data URL, polls the endpoint's stats route for queue
//! depth, and probes reachability at startup. The client carries no retry
//! logic of its own — every attempt is one request, and the dispatcher owns
//! the retry state machine.

mod audio;
mod client;
mod error;

pub use audio::{detect_audio_mime, load_audio_bytes, to_data_url};
pub use client::{Caption, CaptionClient, CaptionRequest};
pub use error::{ClientError, Result};
