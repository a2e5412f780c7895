use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt as _};
use shardcap_client::{Caption, CaptionClient, CaptionRequest};
use shardcap_core::{ItemPayload, WorkItem};

/// Why one processing attempt failed.
///
/// The dispatcher treats every attempt failure as transient until the retry
/// budget is exhausted, so the only payload it needs is the reason string
/// recorded with a permanent failure.
#[derive(Debug, Clone)]
pub struct AttemptError {
    pub reason: String,
}

impl AttemptError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for AttemptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.reason.fmt(f)
    }
}

/// The remote collaborator a dispatcher drains its shard against.
///
/// One `process` call is exactly one attempt: the endpoint never retries
/// internally, and attempts must be safely re-issuable (idempotent or
/// side-effect-free remotely) because checkpoint recovery re-dispatches
/// items whose completion was not yet durable.
pub trait Endpoint: Send + Sync + 'static {
    /// Issue one processing attempt for `item`.
    fn process<'a>(
        &'a self,
        item: &'a WorkItem,
    ) -> BoxFuture<'a, Result<Caption, AttemptError>>;

    /// The endpoint's self-reported queue depth, or `None` if it does not
    /// report one (or the poll failed — the gate fails open; `W` still
    /// bounds local concurrency).
    fn queue_depth(&self) -> BoxFuture<'_, Option<u64>>;

    /// Wait until the endpoint answers at all, up to `deadline`.
    fn wait_ready(&self, deadline: Duration, poll: Duration) -> BoxFuture<'_, bool>;
}

/// Raw audio bytes with their sniffed MIME type.
#[derive(Debug, Clone)]
pub struct AudioBytes {
    pub data: Vec<u8>,
    pub mime: &'static str,
}

/// Resolves an item's payload reference to audio bytes.
///
/// Manifest datasets resolve filesystem paths; externally managed columnar
/// stores plug in their own implementation for row-index payloads.
pub trait AudioSource: Send + Sync + 'static {
    fn load<'a>(&'a self, item: &'a WorkItem)
    -> BoxFuture<'a, Result<AudioBytes, AttemptError>>;
}

/// `AudioSource` for manifest datasets: reads `AudioPath` payloads from the
/// local filesystem and sniffs the MIME type from magic bytes.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileAudioSource;

impl AudioSource for FileAudioSource {
    fn load<'a>(
        &'a self,
        item: &'a WorkItem,
    ) -> BoxFuture<'a, Result<AudioBytes, AttemptError>> {
        async move {
            match &item.payload {
                ItemPayload::AudioPath(path) => {
                    let (data, mime) = shardcap_client::load_audio_bytes(path)
                        .map_err(|e| AttemptError::new(e.to_string()))?;
                    Ok(AudioBytes { data, mime })
                }
                ItemPayload::RowIndex(index) => Err(AttemptError::new(format!(
                    "row-index payload {index} requires a columnar audio source"
                ))),
            }
        }
        .boxed()
    }
}

/// Production endpoint: caption requests against a `CaptionClient`.
pub struct CaptionEndpoint {
    client: CaptionClient,
    source: Arc<dyn AudioSource>,
    max_tokens: u32,
    temperature: f32,
    request_timeout: Duration,
}

impl CaptionEndpoint {
    pub fn new(
        client: CaptionClient,
        source: Arc<dyn AudioSource>,
        max_tokens: u32,
        temperature: f32,
        request_timeout: Duration,
    ) -> Self {
        Self {
            client,
            source,
            max_tokens,
            temperature,
            request_timeout,
        }
    }
}

impl Endpoint for CaptionEndpoint {
    fn process<'a>(
        &'a self,
        item: &'a WorkItem,
    ) -> BoxFuture<'a, Result<Caption, AttemptError>> {
        async move {
            let audio = self.source.load(item).await?;
            let data_url = shardcap_client::to_data_url(&audio.data, audio.mime);
            self.client
                .caption(CaptionRequest {
                    data_url: &data_url,
                    max_tokens: self.max_tokens,
                    temperature: self.temperature,
                    timeout: self.request_timeout,
                })
                .await
                .map_err(|e| AttemptError::new(format!("{e}")))
        }
        .boxed()
    }

    fn queue_depth(&self) -> BoxFuture<'_, Option<u64>> {
        async move {
            match self.client.queue_depth().await {
                Ok(depth) => Some(depth),
                Err(e) => {
                    tracing::warn!("queue depth poll failed, admitting anyway: {e}");
                    None
                }
            }
        }
        .boxed()
    }

    fn wait_ready(&self, deadline: Duration, poll: Duration) -> BoxFuture<'_, bool> {
        async move { self.client.wait_until_ready(deadline, poll).await.is_ok() }.boxed()
    }
}
