//! Content-addressed cache keys.
//!
//! A key is the SHA-256 of the image bytes plus their last-modified time,
//! never the image identifier. Replacing the bytes behind an identifier
//! therefore always yields a new key, so a stale description can't be
//! served for different pixels.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};

use crate::types::ResolvedImage;

/// Prefix shared by every description cache key.
pub const CACHE_PREFIX: &str = "huginn_img_";

/// Key of a cached description.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key from image bytes and modification time.
    pub fn derive(bytes: &[u8], modified: Option<SystemTime>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hasher.update(b"|");
        let mtime = modified
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);
        hasher.update(mtime.to_le_bytes());
        Self(format!("{CACHE_PREFIX}{:x}", hasher.finalize()))
    }

    /// Key for a resolved image.
    pub fn for_image(image: &ResolvedImage) -> Self {
        Self::derive(&image.bytes, image.modified)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
