//! OpenAI-compatible `/chat/completions` vision client.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use super::transcode::{self, Transcoded};
use super::wire::{ChatRequest, ChatResponse, error_message};
use super::{DescribeOptions, ImagePayload, VisionClient};
use crate::limiter::RateLimiter;
use crate::telemetry;
use crate::types::{Description, Usage};
use crate::{HuginnError, Result};

/// Default base URL for the OpenAI API.
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Message used when a non-2xx body carries no structured error.
const UNKNOWN_API_ERROR: &str = "unknown";

/// Vision client for OpenAI-compatible chat completion endpoints.
#[derive(Clone)]
pub struct ChatCompletionsClient {
    http: Client,
    base_url: String,
    limiter: Arc<RateLimiter>,
    temp_dir: Option<PathBuf>,
}

impl ChatCompletionsClient {
    /// Create a client for the public OpenAI API.
    pub fn new(limiter: Arc<RateLimiter>) -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL, limiter)
    }

    /// Create a client with a custom base URL (for testing with wiremock).
    pub fn with_base_url(base_url: impl Into<String>, limiter: Arc<RateLimiter>) -> Result<Self> {
        let http = Client::builder()
            .user_agent(crate::version::user_agent())
            .build()
            .map_err(|e| HuginnError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            limiter,
            temp_dir: None,
        })
    }

    /// Write transcoding temp files under `dir` instead of the system temp dir.
    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    async fn send(
        &self,
        image_url: &str,
        prompt: &str,
        options: &DescribeOptions,
    ) -> Result<Description> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest::describe(&options.model, prompt, image_url, options.max_tokens);

        let start = Instant::now();
        let sent = self
            .http
            .post(&url)
            .bearer_auth(&options.api_key)
            .timeout(options.timeout)
            .json(&body)
            .send()
            .await;
        // A failed call still consumes quota.
        self.limiter.record_call();

        let response = sent.map_err(|e| HuginnError::Transport(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| HuginnError::Transport(e.to_string()))?;
        metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS)
            .record(start.elapsed().as_secs_f64());

        if !status.is_success() {
            let message = error_message(&text).unwrap_or_else(|| UNKNOWN_API_ERROR.to_string());
            return Err(HuginnError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| HuginnError::MalformedResponse(format!("invalid JSON body: {e}")))?;
        let content = parsed.first_text().ok_or_else(|| {
            HuginnError::MalformedResponse("response has no choices[0].message.content".into())
        })?;

        Ok(Description {
            text: content.to_string(),
            usage: parsed.usage.unwrap_or_default(),
        })
    }
}

#[async_trait]
impl VisionClient for ChatCompletionsClient {
    fn name(&self) -> &str {
        "chat_completions"
    }

    async fn describe(
        &self,
        image: &ImagePayload,
        prompt: &str,
        options: &DescribeOptions,
    ) -> Result<Description> {
        if !self.limiter.can_proceed() {
            metrics::counter!(telemetry::RATE_LIMITED_TOTAL).increment(1);
            return Err(HuginnError::RateLimited {
                retry_after: self.limiter.retry_after(),
            });
        }

        // The guard is held until the request finishes; dropping it removes the temp file.
        let (image_url, _transcoded): (String, Option<Transcoded>) = match image {
            ImagePayload::Remote(url) => (url.clone(), None),
            ImagePayload::Inline(resolved) if transcode::needs_transcode(&resolved.mime_type) => {
                let jpeg = transcode::to_jpeg(resolved, self.temp_dir.as_deref()).await?;
                let uri = crate::types::data_uri(jpeg.mime_type(), jpeg.bytes());
                (uri, Some(jpeg))
            }
            ImagePayload::Inline(resolved) => (resolved.data_uri(), None),
        };

        let result = self.send(&image_url, prompt, options).await;
        match &result {
            Ok(description) => {
                let Usage { total_tokens, .. } = description.usage;
                metrics::counter!(telemetry::REQUESTS_TOTAL, "status" => "ok").increment(1);
                metrics::counter!(telemetry::TOKENS_TOTAL).increment(u64::from(total_tokens));
                debug!(model = %options.model, tokens = total_tokens, "describe succeeded");
            }
            Err(e) => {
                metrics::counter!(telemetry::REQUESTS_TOTAL, "status" => "error").increment(1);
                warn!(model = %options.model, kind = e.kind(), error = %e, "describe failed");
            }
        }
        result
    }
}
