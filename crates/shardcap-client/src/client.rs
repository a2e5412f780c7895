use std::time::Duration;

use error_stack::ResultExt as _;
use serde::Deserialize;
use url::Url;

use crate::error::{ClientError, Result};

/// Parameters for one caption attempt.
#[derive(Debug, Clone)]
pub struct CaptionRequest<'a> {
    /// Audio payload as a base64 data URL.
    pub data_url: &'a str,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Hard per-request deadline; expiry feeds the dispatcher's retry path.
    pub timeout: Duration,
}

/// A successful caption response.
#[derive(Debug, Clone)]
pub struct Caption {
    pub text: String,
    /// Token usage reported by the endpoint, passed through verbatim.
    pub usage: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Deserialize)]
struct StatsResponse {
    num_queued: u64,
}

/// Client for one OpenAI-compatible caption inference endpoint.
///
/// Holds a pooled `reqwest::Client` and pre-built routes; cheap to clone.
#[derive(Clone, Debug)]
pub struct CaptionClient {
    client: reqwest::Client,
    completions_url: String,
    models_url: String,
    stats_url: String,
    model: String,
    request_headers: reqwest::header::HeaderMap,
}

impl CaptionClient {
    /// Build a client for `base_url` (e.g. `http://127.0.0.1:8901/v1`).
    ///
    /// The stats route lives beside the API root, not under it, matching
    /// the server's monitoring surface.
    pub fn try_new(base_url: &str, model: impl Into<String>) -> Result<Self> {
        let parsed = Url::parse(base_url)
            .change_context_lazy(|| ClientError::InvalidUrl(base_url.to_owned()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(error_stack::report!(ClientError::InvalidUrl(
                base_url.to_owned()
            ))
            .attach_printable("only http/https endpoints are supported"));
        }

        let base = base_url.trim_end_matches('/');
        let origin = {
            let mut o = parsed.clone();
            o.set_path("");
            o.as_str().trim_end_matches('/').to_owned()
        };

        let mut request_headers = reqwest::header::HeaderMap::new();
        request_headers.insert(
            reqwest::header::CONTENT_TYPE,
            "application/json".parse().unwrap(),
        );
        request_headers.insert(reqwest::header::ACCEPT, "application/json".parse().unwrap());

        Ok(Self {
            client: reqwest::Client::new(),
            completions_url: format!("{base}/chat/completions"),
            models_url: format!("{base}/models"),
            stats_url: format!("{origin}/stats"),
            model: model.into(),
            request_headers,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Issue one caption request. One call is one attempt; timeouts and
    /// transport failures surface as errors for the caller to retry.
    pub async fn caption(&self, request: CaptionRequest<'_>) -> Result<Caption> {
        let payload = serde_json::json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": [{
                    "type": "audio_url",
                    "audio_url": { "url": request.data_url },
                }],
            }],
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });

        let response = self
            .client
            .post(&self.completions_url)
            .headers(self.request_headers.clone())
            .timeout(request.timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    error_stack::report!(ClientError::Timeout)
                } else {
                    error_stack::report!(ClientError::Send).attach_printable(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(error_stack::report!(ClientError::Status(status.as_u16()))
                .attach_printable(truncate_body(&body)));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .change_context(ClientError::Recv)
            .attach_printable("failed to read caption response body")?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| error_stack::report!(ClientError::MalformedResponse))
            .attach_printable("caption response contained no choices")?;

        Ok(Caption {
            text: choice.message.content,
            usage: parsed.usage,
        })
    }

    /// Read the endpoint's self-reported request-queue depth.
    pub async fn queue_depth(&self) -> Result<u64> {
        let response = self
            .client
            .get(&self.stats_url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .change_context(ClientError::Send)
            .attach_printable_lazy(|| format!("failed to poll {}", self.stats_url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(error_stack::report!(ClientError::Status(status.as_u16()))
                .attach_printable(format!("stats route {}", self.stats_url)));
        }

        let stats: StatsResponse = response
            .json()
            .await
            .change_context(ClientError::MalformedResponse)
            .attach_printable("stats response missing num_queued")?;
        Ok(stats.num_queued)
    }

    /// Poll the models route until the endpoint answers, or fail once the
    /// startup deadline lapses. Any HTTP response counts as reachable.
    pub async fn wait_until_ready(&self, deadline: Duration, poll: Duration) -> Result<()> {
        let started = tokio::time::Instant::now();
        loop {
            match self
                .client
                .get(&self.models_url)
                .timeout(poll.min(Duration::from_secs(10)))
                .send()
                .await
            {
                Ok(response) => {
                    tracing::debug!(status = %response.status(), "endpoint reachable");
                    return Ok(());
                }
                Err(e) if started.elapsed() + poll > deadline => {
                    return Err(error_stack::report!(ClientError::Unreachable)
                        .attach_printable(format!("last probe of {}: {e}", self.models_url)));
                }
                Err(e) => {
                    tracing::info!(
                        elapsed_s = started.elapsed().as_secs(),
                        "endpoint not ready yet: {e}"
                    );
                    tokio::time::sleep(poll).await;
                }
            }
        }
    }
}

/// Keep attached response bodies short enough to read in a stack trace.
fn truncate_body(body: &str) -> String {
    const MAX: usize = 512;
    if body.len() <= MAX {
        body.to_owned()
    } else {
        let cut = body
            .char_indices()
            .take_while(|(i, _)| *i < MAX)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        format!("{}… ({} bytes)", &body[..cut], body.len())
    }
}
