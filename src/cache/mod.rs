//! Description cache.
//!
//! - [`CacheKey`]: content-addressed key (SHA-256 of bytes + mtime).
//! - [`CacheStore`]: expiring key-value seam; [`MemoryCacheStore`] is the
//!   bundled moka implementation.
//!
//! The cache sits in [`EnrichmentService`](crate::EnrichmentService) in
//! front of the rate limiter and the API client. A hit bypasses both.
//! Invalidation is explicit: the host calls
//! [`EnrichmentService::invalidate`](crate::EnrichmentService::invalidate)
//! when an image is replaced, edited or deleted.

pub mod key;
pub mod store;

pub use key::{CACHE_PREFIX, CacheKey};
pub use store::{CacheStore, MemoryCacheStore};
