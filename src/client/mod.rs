//! Vision API client.
//!
//! [`VisionClient`] is the seam between the enrichment service and the
//! upstream model. [`ChatCompletionsClient`] speaks the OpenAI-compatible
//! `/chat/completions` protocol with an image content part.
//!
//! A client executes exactly one attempt per call. It consults the shared
//! [`RateLimiter`](crate::RateLimiter) before sending and records the call
//! after sending, whatever the outcome. Retries belong to the caller.

mod chat;
pub mod transcode;
mod wire;

use std::time::Duration;

use async_trait::async_trait;

use crate::Result;
use crate::config::EnrichmentConfig;
use crate::types::{Description, ResolvedImage};

pub use chat::ChatCompletionsClient;

/// Image content attached to a describe request.
#[derive(Debug, Clone)]
pub enum ImagePayload {
    /// Bytes sent inline as a `data:` URI, transcoded first if the API
    /// can't read the encoding.
    Inline(ResolvedImage),
    /// A publicly reachable URL the API fetches itself.
    Remote(String),
}

/// Per-call request options, taken from the current configuration.
#[derive(Clone)]
pub struct DescribeOptions {
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl DescribeOptions {
    /// Options for `config`, or `None` when it carries no credential.
    pub fn from_config(config: &EnrichmentConfig) -> Option<Self> {
        let api_key = config.credential()?;
        Some(Self {
            api_key: api_key.to_string(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            timeout: config.timeout(),
        })
    }
}

impl std::fmt::Debug for DescribeOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescribeOptions")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Single-attempt image description.
#[async_trait]
pub trait VisionClient: Send + Sync {
    /// Name for logging.
    fn name(&self) -> &str;

    /// Describe `image` following `prompt`.
    async fn describe(
        &self,
        image: &ImagePayload,
        prompt: &str,
        options: &DescribeOptions,
    ) -> Result<Description>;
}
