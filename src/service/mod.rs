//! The enrichment service: describe one image, end to end.
//!
//! Per call, [`EnrichmentService::generate`] walks this sequence:
//!
//! 1. resolve the image bytes and derive the content-addressed cache key
//! 2. unless previewing, return a live cached description, persisting it
//!    for this image through the [`AltTextSink`] first
//! 3. require a credential in the current configuration
//! 4. render the instruction and call the vision client (transient
//!    failures retried per [`RetryConfig`])
//! 5. on success, unless previewing: persist through the sink, run language
//!    sync, then cache with the configured TTL; finally record statistics
//!
//! Failures are stored as the last error and returned. Nothing is cached
//! or recorded for a failed call, and a sink failure leaves the cache
//! untouched.

mod builder;

use std::sync::{Arc, Mutex};

use tracing::{debug, info, instrument, warn};

use crate::cache::{CACHE_PREFIX, CacheKey, CacheStore};
use crate::client::{DescribeOptions, ImagePayload, VisionClient, transcode};
use crate::config::{ConfigProvider, EnrichmentConfig};
use crate::prompt;
use crate::resolve::ImageResolver;
use crate::retry::{RetryConfig, with_retry};
use crate::stats::{NewRecord, StatisticsStore};
use crate::sync::{AltTextSink, LanguageSync};
use crate::telemetry;
use crate::types::{
    Description, Enrichment, GenerationMode, ImageId, ImageRef, ImageSource, Improvement,
    ResolvedImage,
};
use crate::{HuginnError, Result};

pub use builder::EnrichmentServiceBuilder;

/// Orchestrates cache, limiter-gated client, persistence and statistics.
///
/// Create once and share via `Arc`; every method takes `&self`.
pub struct EnrichmentService {
    config: Arc<dyn ConfigProvider>,
    cache: Arc<dyn CacheStore>,
    client: Arc<dyn VisionClient>,
    resolver: Arc<dyn ImageResolver>,
    stats: Arc<dyn StatisticsStore>,
    sink: Arc<dyn AltTextSink>,
    language_sync: Arc<dyn LanguageSync>,
    retry: RetryConfig,
    last_error: Mutex<Option<String>>,
}

impl EnrichmentService {
    /// Start building a service around a configuration source.
    pub fn builder(config: impl ConfigProvider + 'static) -> EnrichmentServiceBuilder {
        EnrichmentServiceBuilder::new(Arc::new(config))
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> EnrichmentConfig {
        self.config.current()
    }

    pub fn stats(&self) -> &Arc<dyn StatisticsStore> {
        &self.stats
    }

    pub fn sink(&self) -> &Arc<dyn AltTextSink> {
        &self.sink
    }

    /// Message of the most recent failed generation.
    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Generate a description for `image`.
    ///
    /// With `preview`, the cache is neither read nor written and nothing is
    /// persisted; the statistics row is recorded as not applied.
    #[instrument(skip(self, image, mode), fields(image_id = %image.id, mode = %mode))]
    pub async fn generate(
        &self,
        image: &ImageRef,
        mode: GenerationMode,
        preview: bool,
    ) -> Result<Enrichment> {
        let result = self.generate_inner(image, &mode, preview).await;
        if let Err(e) = &result {
            self.set_last_error(e);
        }
        result
    }

    async fn generate_inner(
        &self,
        image: &ImageRef,
        mode: &GenerationMode,
        preview: bool,
    ) -> Result<Enrichment> {
        let config = self.config.current();
        let resolved = self.resolver.resolve(image).await?;
        let key = CacheKey::for_image(&resolved);

        if !preview {
            if let Some(text) = self.cache.get(key.as_str()).await {
                metrics::counter!(telemetry::CACHE_HITS_TOTAL, "mode" => mode.as_str().to_owned())
                    .increment(1);
                debug!(key = %key, "cache hit");
                // Keys are content-addressed: the hit may come from another image.
                self.persist(&image.id, &text).await?;
                return Ok(Enrichment {
                    text,
                    tokens_used: 0,
                    cached: true,
                    preview: false,
                });
            }
            metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "mode" => mode.as_str().to_owned())
                .increment(1);
        }

        let options = describe_options(&config)?;
        let instruction = prompt::instruction(&config);
        let payload = payload_for(image, resolved, &config);
        let description = self.describe(&payload, &instruction, &options).await?;
        let tokens = description.tokens_used();

        if !preview {
            // Cache only what the sink accepted, so a hit always implies stored text.
            self.persist(&image.id, &description.text).await?;
            self.cache
                .set(key.as_str(), description.text.clone(), config.cache_ttl())
                .await;
        }

        self.record(
            NewRecord::generated(image.id.clone(), &description.text, tokens, mode.clone())
                .applied(!preview),
        )
        .await;

        info!(tokens, preview, "generated description");
        Ok(Enrichment {
            text: description.text,
            tokens_used: tokens,
            cached: false,
            preview,
        })
    }

    /// Ask for a revised description of `image`, steering away from
    /// `original_text` in the direction of `improvement`.
    ///
    /// Always a preview: the cache is bypassed and the result is not
    /// persisted until [`apply`](Self::apply) is called.
    #[instrument(skip(self, image, original_text), fields(image_id = %image.id))]
    pub async fn regenerate(
        &self,
        image: &ImageRef,
        improvement: &Improvement,
        original_text: &str,
    ) -> Result<Enrichment> {
        let result = self.regenerate_inner(image, improvement, original_text).await;
        if let Err(e) = &result {
            self.set_last_error(e);
        }
        result
    }

    async fn regenerate_inner(
        &self,
        image: &ImageRef,
        improvement: &Improvement,
        original_text: &str,
    ) -> Result<Enrichment> {
        let config = self.config.current();
        let resolved = self.resolver.resolve(image).await?;
        let options = describe_options(&config)?;
        let instruction = prompt::improvement_instruction(&config, improvement, original_text);
        let payload = payload_for(image, resolved, &config);
        let description = self.describe(&payload, &instruction, &options).await?;
        let tokens = description.tokens_used();

        self.record(NewRecord::generated(
            image.id.clone(),
            &description.text,
            tokens,
            GenerationMode::Manual,
        ))
        .await;

        Ok(Enrichment {
            text: description.text,
            tokens_used: tokens,
            cached: false,
            preview: true,
        })
    }

    /// Persist reviewed text for `image`.
    ///
    /// Marks the latest statistics row whose text is `original_text` as
    /// applied. When `edited`, the stored text differs from anything the
    /// cache holds, so the image's cache entry is dropped.
    #[instrument(skip(self, image, text, original_text), fields(image_id = %image.id))]
    pub async fn apply(
        &self,
        image: &ImageRef,
        text: &str,
        original_text: &str,
        edited: bool,
    ) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Err(HuginnError::InvalidInput("alt text must not be empty".into()));
        }

        self.sink.store(&image.id, text).await?;

        let edited_text = edited.then_some(text);
        match self
            .stats
            .mark_applied(&image.id, original_text, edited_text)
            .await
        {
            Ok(true) => {}
            Ok(false) => debug!("no statistics row matched the applied text"),
            Err(e) => stats_write_failed(&e),
        }

        self.sync_languages(&image.id, text).await;

        if edited && let Err(e) = self.invalidate(image).await {
            warn!(error = %e, "failed to invalidate cache after edit");
        }
        Ok(())
    }

    /// Drop the cached description for `image`. Returns whether one existed.
    pub async fn invalidate(&self, image: &ImageRef) -> Result<bool> {
        let resolved = self.resolver.resolve(image).await?;
        let key = CacheKey::for_image(&resolved);
        Ok(self.invalidate_key(&key).await)
    }

    /// Drop a cache entry by key. Returns whether one existed.
    pub async fn invalidate_key(&self, key: &CacheKey) -> bool {
        let existed = self.cache.get(key.as_str()).await.is_some();
        self.cache.invalidate(key.as_str()).await;
        debug!(key = %key, existed, "invalidated cache entry");
        existed
    }

    /// Whether a live description is cached for `image`'s current bytes.
    pub async fn is_cached(&self, image: &ImageRef) -> Result<bool> {
        let resolved = self.resolver.resolve(image).await?;
        let key = CacheKey::for_image(&resolved);
        Ok(self.cache.get(key.as_str()).await.is_some())
    }

    /// Number of cached descriptions.
    pub async fn cache_size(&self) -> u64 {
        self.cache.count(CACHE_PREFIX).await
    }

    /// Drop every cached description. Returns the number removed.
    pub async fn clear_cache(&self) -> u64 {
        let removed = self.cache.invalidate_all(CACHE_PREFIX).await;
        info!(removed, "cleared description cache");
        removed
    }

    async fn describe(
        &self,
        payload: &ImagePayload,
        instruction: &str,
        options: &DescribeOptions,
    ) -> Result<Description> {
        with_retry(&self.retry, "describe", || {
            self.client.describe(payload, instruction, options)
        })
        .await
    }

    async fn record(&self, record: NewRecord) {
        if let Err(e) = self.stats.record(record).await {
            stats_write_failed(&e);
        }
    }

    async fn persist(&self, image: &ImageId, text: &str) -> Result<()> {
        self.sink.store(image, text).await?;
        self.sync_languages(image, text).await;
        Ok(())
    }

    async fn sync_languages(&self, image: &ImageId, text: &str) {
        if let Err(e) = self.language_sync.sync(image, text, self.sink.as_ref()).await {
            warn!(
                sync = self.language_sync.name(),
                error = %e,
                "language sync failed"
            );
        }
    }

    fn set_last_error(&self, e: &HuginnError) {
        warn!(kind = e.kind(), error = %e, "enrichment failed");
        *self.last_error.lock().unwrap_or_else(|e| e.into_inner()) = Some(e.to_string());
    }
}

fn describe_options(config: &EnrichmentConfig) -> Result<DescribeOptions> {
    DescribeOptions::from_config(config)
        .ok_or_else(|| HuginnError::Configuration("API key is not configured".into()))
}

/// Remote images the API can read are linked when inlining is off.
fn payload_for(image: &ImageRef, resolved: ResolvedImage, config: &EnrichmentConfig) -> ImagePayload {
    match &image.source {
        ImageSource::Url(url)
            if !config.inline_remote_images && transcode::supports_mime(&resolved.mime_type) =>
        {
            ImagePayload::Remote(url.clone())
        }
        _ => ImagePayload::Inline(resolved),
    }
}

fn stats_write_failed(e: &HuginnError) {
    metrics::counter!(telemetry::STATS_WRITE_FAILURES_TOTAL).increment(1);
    warn!(error = %e, "failed to write statistics");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png() -> ResolvedImage {
        ResolvedImage::new(vec![0x89, b'P', b'N', b'G'], "image/png")
    }

    #[test]
    fn remote_linked_only_when_inlining_disabled() {
        let image = ImageRef::url("1", "https://cdn.example.com/a.png");
        let inline = EnrichmentConfig::new();
        let linked = EnrichmentConfig::new().inline_remote_images(false);

        assert!(matches!(payload_for(&image, png(), &inline), ImagePayload::Inline(_)));
        assert!(matches!(
            payload_for(&image, png(), &linked),
            ImagePayload::Remote(url) if url == "https://cdn.example.com/a.png"
        ));
    }

    #[test]
    fn remote_needing_transcode_is_inlined() {
        let image = ImageRef::url("1", "https://cdn.example.com/a.avif");
        let config = EnrichmentConfig::new().inline_remote_images(false);
        let avif = ResolvedImage::new(vec![0; 4], "image/avif");
        assert!(matches!(payload_for(&image, avif, &config), ImagePayload::Inline(_)));
    }

    #[test]
    fn local_files_are_always_inlined() {
        let image = ImageRef::file("1", "/tmp/a.png");
        let config = EnrichmentConfig::new().inline_remote_images(false);
        assert!(matches!(payload_for(&image, png(), &config), ImagePayload::Inline(_)));
    }

    #[test]
    fn missing_credential_is_configuration_error() {
        let err = describe_options(&EnrichmentConfig::new()).unwrap_err();
        assert!(matches!(err, HuginnError::Configuration(_)));
    }
}
