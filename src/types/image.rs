//! Image identity and byte-source types

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

/// Opaque, stable identifier of an image in the host system.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageId(String);

impl ImageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ImageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ImageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<u64> for ImageId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

/// Where the bytes of an image live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageSource {
    /// Local file.
    Path(PathBuf),
    /// Remote `http(s)` URL.
    Url(String),
}

/// An image to enrich: identifier plus resolvable byte source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub id: ImageId,
    pub source: ImageSource,
}

impl ImageRef {
    /// Image backed by a local file.
    pub fn file(id: impl Into<ImageId>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            source: ImageSource::Path(path.into()),
        }
    }

    /// Image backed by a remote URL.
    pub fn url(id: impl Into<ImageId>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: ImageSource::Url(url.into()),
        }
    }

    /// Remote URL, if this is a remote image.
    pub fn remote_url(&self) -> Option<&str> {
        match &self.source {
            ImageSource::Url(url) => Some(url),
            ImageSource::Path(_) => None,
        }
    }
}

/// Image bytes as produced by an [`ImageResolver`](crate::resolve::ImageResolver).
#[derive(Clone)]
pub struct ResolvedImage {
    pub bytes: Vec<u8>,
    /// MIME type, e.g. `image/jpeg`.
    pub mime_type: String,
    /// Last-modified time, when the source reports one.
    pub modified: Option<SystemTime>,
}

impl ResolvedImage {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
            modified: None,
        }
    }

    pub fn with_modified(mut self, modified: SystemTime) -> Self {
        self.modified = Some(modified);
        self
    }

    /// `data:` URI embedding the bytes as base64.
    pub fn data_uri(&self) -> String {
        data_uri(&self.mime_type, &self.bytes)
    }
}

impl fmt::Debug for ResolvedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedImage")
            .field("len", &self.bytes.len())
            .field("mime_type", &self.mime_type)
            .field("modified", &self.modified)
            .finish()
    }
}

/// Build a base64 `data:` URI.
pub fn data_uri(mime_type: &str, bytes: &[u8]) -> String {
    format!("data:{mime_type};base64,{}", STANDARD.encode(bytes))
}

/// Detect the MIME type from magic bytes, falling back to `None`.
pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    ::image::guess_format(bytes).ok().map(|f| f.to_mime_type())
}

/// Guess the MIME type from a file extension.
pub fn mime_from_extension(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "avif" => "image/avif",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "heic" => "image/heic",
        _ => return None,
    };
    Some(mime)
}
