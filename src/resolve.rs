//! Image byte resolution.
//!
//! The enrichment core needs the raw bytes of every image (the cache key
//! is derived from them) plus a MIME type. Hosts plug their own storage in
//! through [`ImageResolver`]; [`DefaultResolver`] covers local files and
//! plain `http(s)` URLs.

use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{CONTENT_TYPE, LAST_MODIFIED};
use tracing::debug;

use crate::types::{ImageRef, ImageSource, ResolvedImage, mime_from_extension, sniff_mime};
use crate::{HuginnError, Result};

/// Resolves an [`ImageRef`] to bytes and a MIME type.
#[async_trait]
pub trait ImageResolver: Send + Sync {
    async fn resolve(&self, image: &ImageRef) -> Result<ResolvedImage>;
}

/// Largest image accepted by default: the vision API's 20 MiB limit.
pub const DEFAULT_MAX_IMAGE_BYTES: u64 = 20 * 1024 * 1024;

/// Resolver for local paths and remote URLs.
#[derive(Clone)]
pub struct DefaultResolver {
    http: Client,
    max_bytes: u64,
}

impl DefaultResolver {
    /// Create a resolver with a 30s fetch timeout.
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(crate::version::user_agent())
            .build()
            .map_err(|e| HuginnError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_http_client(http))
    }

    /// Create a resolver sharing an existing HTTP client.
    pub fn with_http_client(http: Client) -> Self {
        Self {
            http,
            max_bytes: DEFAULT_MAX_IMAGE_BYTES,
        }
    }

    /// Reject images larger than `max_bytes`.
    pub fn max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    fn too_large(&self, source: &str, len: u64) -> HuginnError {
        HuginnError::ImageSource(format!(
            "{source} is {len} bytes, over the {} byte limit",
            self.max_bytes
        ))
    }

    async fn resolve_path(&self, path: &std::path::Path) -> Result<ResolvedImage> {
        let metadata = tokio::fs::metadata(path).await.map_err(|e| {
            HuginnError::ImageSource(format!("failed to read {}: {e}", path.display()))
        })?;
        if metadata.len() > self.max_bytes {
            return Err(self.too_large(&path.display().to_string(), metadata.len()));
        }
        let modified = metadata.modified().ok();
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            HuginnError::ImageSource(format!("failed to read {}: {e}", path.display()))
        })?;

        let mime = sniff_mime(&bytes)
            .or_else(|| mime_from_extension(path))
            .ok_or_else(|| {
                HuginnError::ImageSource(format!("{} is not a recognised image", path.display()))
            })?;

        let mut image = ResolvedImage::new(bytes, mime);
        image.modified = modified;
        Ok(image)
    }

    async fn resolve_url(&self, url: &str) -> Result<ResolvedImage> {
        let mut response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| HuginnError::ImageSource(format!("failed to fetch {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(HuginnError::ImageSource(format!(
                "fetching {url} returned HTTP {status}"
            )));
        }

        let header_mime = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_ascii_lowercase())
            .filter(|v| v.starts_with("image/"));
        let modified = response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_http_date);

        if let Some(len) = response.content_length()
            && len > self.max_bytes
        {
            return Err(self.too_large(url, len));
        }

        // Content-Length may be absent or wrong; enforce the cap while reading.
        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| HuginnError::ImageSource(format!("failed to read body of {url}: {e}")))?
        {
            if (bytes.len() + chunk.len()) as u64 > self.max_bytes {
                return Err(self.too_large(url, (bytes.len() + chunk.len()) as u64));
            }
            bytes.extend_from_slice(&chunk);
        }

        let mime = match sniff_mime(&bytes) {
            Some(sniffed) => sniffed.to_string(),
            None => header_mime.ok_or_else(|| {
                HuginnError::ImageSource(format!("{url} did not return an image"))
            })?,
        };
        debug!(url, mime = %mime, len = bytes.len(), "fetched remote image");

        let mut image = ResolvedImage::new(bytes, mime);
        image.modified = modified;
        Ok(image)
    }
}

#[async_trait]
impl ImageResolver for DefaultResolver {
    async fn resolve(&self, image: &ImageRef) -> Result<ResolvedImage> {
        match &image.source {
            ImageSource::Path(path) => self.resolve_path(path).await,
            ImageSource::Url(url) => self.resolve_url(url).await,
        }
    }
}

/// Parse an RFC 2822 / IMF-fixdate `Last-Modified` value.
fn parse_http_date(value: &str) -> Option<SystemTime> {
    chrono::DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|dt| SystemTime::from(dt.with_timezone(&chrono::Utc)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_imf_fixdate() {
        let parsed = parse_http_date("Wed, 21 Oct 2015 07:28:00 GMT").unwrap();
        let secs = parsed
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap()
            .as_secs();
        assert_eq!(secs, 1_445_412_480);
    }

    #[test]
    fn rejects_garbage_date() {
        assert!(parse_http_date("yesterday").is_none());
    }
}
