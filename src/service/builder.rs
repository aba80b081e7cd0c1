//! Builder for wiring an [`EnrichmentService`].

use std::sync::{Arc, Mutex};

use super::EnrichmentService;
use crate::Result;
use crate::cache::{CacheStore, MemoryCacheStore};
use crate::client::{ChatCompletionsClient, VisionClient};
use crate::config::ConfigProvider;
use crate::limiter::{RateLimitConfig, RateLimiter};
use crate::resolve::{DefaultResolver, ImageResolver};
use crate::retry::RetryConfig;
use crate::stats::{MemoryStatistics, StatisticsStore};
use crate::sync::{AltTextSink, LanguageSync, MemorySink, NoLanguageSync};

/// Builder for [`EnrichmentService`].
///
/// Every collaborator has a default:
///
/// | collaborator | default |
/// |---|---|
/// | cache | [`MemoryCacheStore`] |
/// | client | [`ChatCompletionsClient`] against the configured `base_url` |
/// | limiter | `rate_limit_per_window` per `rate_window_secs`, fixed at build time |
/// | resolver | [`DefaultResolver`] |
/// | statistics | [`MemoryStatistics`] |
/// | sink | [`MemorySink`] |
/// | language sync | [`NoLanguageSync`] |
pub struct EnrichmentServiceBuilder {
    config: Arc<dyn ConfigProvider>,
    cache: Option<Arc<dyn CacheStore>>,
    client: Option<Arc<dyn VisionClient>>,
    limiter: Option<Arc<RateLimiter>>,
    resolver: Option<Arc<dyn ImageResolver>>,
    stats: Option<Arc<dyn StatisticsStore>>,
    sink: Option<Arc<dyn AltTextSink>>,
    language_sync: Option<Arc<dyn LanguageSync>>,
    retry: RetryConfig,
}

impl EnrichmentServiceBuilder {
    pub fn new(config: Arc<dyn ConfigProvider>) -> Self {
        Self {
            config,
            cache: None,
            client: None,
            limiter: None,
            resolver: None,
            stats: None,
            sink: None,
            language_sync: None,
            retry: RetryConfig::default(),
        }
    }

    pub fn cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Use a custom vision client. The limiter setting is then ignored;
    /// the client is responsible for its own gating.
    pub fn client(mut self, client: Arc<dyn VisionClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Share a limiter with other services.
    pub fn limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn ImageResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn stats(mut self, stats: Arc<dyn StatisticsStore>) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn AltTextSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn language_sync(mut self, sync: Arc<dyn LanguageSync>) -> Self {
        self.language_sync = Some(sync);
        self
    }

    /// Retry policy for transient client failures.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn build(self) -> Result<EnrichmentService> {
        let initial = self.config.current();

        let client: Arc<dyn VisionClient> = match self.client {
            Some(client) => client,
            None => {
                let limiter = self.limiter.unwrap_or_else(|| {
                    Arc::new(RateLimiter::new(
                        RateLimitConfig::new()
                            .max_calls(initial.rate_limit_per_window)
                            .window(initial.rate_window()),
                    ))
                });
                Arc::new(ChatCompletionsClient::with_base_url(&initial.base_url, limiter)?)
            }
        };

        let resolver: Arc<dyn ImageResolver> = match self.resolver {
            Some(resolver) => resolver,
            None => Arc::new(DefaultResolver::with_timeout(initial.timeout())?),
        };

        Ok(EnrichmentService {
            config: self.config,
            cache: self
                .cache
                .unwrap_or_else(|| MemoryCacheStore::new().shared()),
            client,
            resolver,
            stats: self
                .stats
                .unwrap_or_else(|| Arc::new(MemoryStatistics::new())),
            sink: self.sink.unwrap_or_else(|| Arc::new(MemorySink::new())),
            language_sync: self
                .language_sync
                .unwrap_or_else(|| Arc::new(NoLanguageSync)),
            retry: self.retry,
            last_error: Mutex::new(None),
        })
    }
}
