//! Expiring key-value store backing the description cache.
//!
//! [`CacheStore`] is the seam: anything with per-key expiry (an external
//! cache, a database table with an expiry column) can implement it. The
//! bundled [`MemoryCacheStore`] uses moka's async cache with a per-entry
//! expiry policy, so each `set` carries its own TTL. The TTL is supplied by
//! the caller on every write rather than fixed at construction.
//!
//! Concurrent writers to the same key are last-writer-wins.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;

/// Default maximum number of entries held in memory.
const DEFAULT_MAX_ENTRIES: u64 = 100_000;

/// Key-value store with per-key expiry.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Value for `key`, or `None` when absent or expired.
    async fn get(&self, key: &str) -> Option<String>;

    /// Insert or overwrite `key`, expiring after `ttl`.
    async fn set(&self, key: &str, value: String, ttl: Duration);

    /// Remove a single key.
    async fn invalidate(&self, key: &str);

    /// Remove every key starting with `prefix`. Returns the number removed.
    async fn invalidate_all(&self, prefix: &str) -> u64;

    /// Number of live keys starting with `prefix`.
    async fn count(&self, prefix: &str) -> u64;
}

#[derive(Clone)]
struct StoredValue {
    value: String,
    ttl: Duration,
}

/// Expiry policy reading the TTL stored with each value.
struct PerEntryTtl;

impl Expiry<String, StoredValue> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &StoredValue,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &StoredValue,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process [`CacheStore`] backed by moka.
///
/// Thread-safe; clones share the same underlying cache.
#[derive(Clone)]
pub struct MemoryCacheStore {
    cache: Cache<String, StoredValue>,
}

impl MemoryCacheStore {
    /// Create a store with the default capacity (100,000 entries).
    pub fn new() -> Self {
        Self::with_max_entries(DEFAULT_MAX_ENTRIES)
    }

    /// Create a store with a custom capacity.
    pub fn with_max_entries(max: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max)
            .expire_after(PerEntryTtl)
            .build();
        Self { cache }
    }

    /// Wrap in an `Arc<dyn CacheStore>`.
    pub fn shared(self) -> Arc<dyn CacheStore> {
        Arc::new(self)
    }

    fn keys_with_prefix(&self, prefix: &str) -> Vec<Arc<String>> {
        self.cache
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key)
            .collect()
    }
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Option<String> {
        self.cache.get(key).await.map(|stored| stored.value)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) {
        self.cache
            .insert(key.to_string(), StoredValue { value, ttl })
            .await;
    }

    async fn invalidate(&self, key: &str) {
        self.cache.invalidate(key).await;
    }

    async fn invalidate_all(&self, prefix: &str) -> u64 {
        let keys = self.keys_with_prefix(prefix);
        for key in &keys {
            self.cache.invalidate(key.as_str()).await;
        }
        keys.len() as u64
    }

    async fn count(&self, prefix: &str) -> u64 {
        self.keys_with_prefix(prefix).len() as u64
    }
}
