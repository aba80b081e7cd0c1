//! Persisting applied text and propagating it to other locales.
//!
//! [`AltTextSink`] is the host's metadata store. [`LanguageSync`] is the
//! multi-language capability, chosen once at startup with
//! [`detect_language_sync`] and then called after every persisted result.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::debug;

use crate::types::ImageId;
use crate::{HuginnError, Result};

/// Where finished alt text is written.
#[async_trait]
pub trait AltTextSink: Send + Sync {
    /// Store the primary text for an image.
    async fn store(&self, image: &ImageId, text: &str) -> Result<()>;

    /// Store the text for a specific locale.
    async fn store_localized(&self, image: &ImageId, locale: &str, text: &str) -> Result<()>;

    /// Currently stored primary text, if any.
    async fn current(&self, image: &ImageId) -> Result<Option<String>>;
}

/// In-memory sink.
#[derive(Default)]
pub struct MemorySink {
    primary: Mutex<HashMap<ImageId, String>>,
    localized: Mutex<HashMap<(ImageId, String), String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, image: &ImageId) -> Option<String> {
        self.primary
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(image)
            .cloned()
    }

    pub fn get_localized(&self, image: &ImageId, locale: &str) -> Option<String> {
        self.localized
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(image.clone(), locale.to_string()))
            .cloned()
    }
}

#[async_trait]
impl AltTextSink for MemorySink {
    async fn store(&self, image: &ImageId, text: &str) -> Result<()> {
        self.primary
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(image.clone(), text.to_string());
        Ok(())
    }

    async fn store_localized(&self, image: &ImageId, locale: &str, text: &str) -> Result<()> {
        self.localized
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert((image.clone(), locale.to_string()), text.to_string());
        Ok(())
    }

    async fn current(&self, image: &ImageId) -> Result<Option<String>> {
        Ok(self.get(image))
    }
}

/// Sink writing `<image>.alt.txt` next to each image file.
///
/// Image ids are interpreted as file paths. Localized text goes to
/// `<image>.alt.<locale>.txt`.
#[derive(Debug, Clone, Default)]
pub struct SidecarSink;

impl SidecarSink {
    pub fn new() -> Self {
        Self
    }

    /// Sidecar path for `image`, optionally localized.
    pub fn sidecar_path(image: &ImageId, locale: Option<&str>) -> PathBuf {
        let suffix = match locale {
            Some(locale) => format!(".alt.{locale}.txt"),
            None => ".alt.txt".to_string(),
        };
        PathBuf::from(format!("{}{suffix}", image.as_str()))
    }

    async fn write(path: PathBuf, text: &str) -> Result<()> {
        tokio::fs::write(&path, format!("{text}\n"))
            .await
            .map_err(|e| HuginnError::Storage(format!("failed to write {}: {e}", path.display())))?;
        debug!(path = %path.display(), "wrote sidecar");
        Ok(())
    }
}

#[async_trait]
impl AltTextSink for SidecarSink {
    async fn store(&self, image: &ImageId, text: &str) -> Result<()> {
        Self::write(Self::sidecar_path(image, None), text).await
    }

    async fn store_localized(&self, image: &ImageId, locale: &str, text: &str) -> Result<()> {
        Self::write(Self::sidecar_path(image, Some(locale)), text).await
    }

    async fn current(&self, image: &ImageId) -> Result<Option<String>> {
        let path = Self::sidecar_path(image, None);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => {
                let text = text.trim();
                Ok((!text.is_empty()).then(|| text.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(HuginnError::Storage(format!(
                "failed to read {}: {e}",
                path.display()
            ))),
        }
    }
}

/// Propagates persisted text to other locales.
#[async_trait]
pub trait LanguageSync: Send + Sync {
    fn name(&self) -> &str;

    async fn sync(&self, image: &ImageId, text: &str, sink: &dyn AltTextSink) -> Result<()>;
}

/// Single-language hosts.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLanguageSync;

#[async_trait]
impl LanguageSync for NoLanguageSync {
    fn name(&self) -> &str {
        "none"
    }

    async fn sync(&self, _image: &ImageId, _text: &str, _sink: &dyn AltTextSink) -> Result<()> {
        Ok(())
    }
}

/// Copies the text to every configured locale.
#[derive(Debug, Clone)]
pub struct LocaleFanout {
    locales: Vec<String>,
}

impl LocaleFanout {
    pub fn new(locales: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            locales: locales.into_iter().map(Into::into).collect(),
        }
    }

    pub fn locales(&self) -> &[String] {
        &self.locales
    }
}

#[async_trait]
impl LanguageSync for LocaleFanout {
    fn name(&self) -> &str {
        "locale_fanout"
    }

    async fn sync(&self, image: &ImageId, text: &str, sink: &dyn AltTextSink) -> Result<()> {
        for locale in &self.locales {
            sink.store_localized(image, locale, text).await?;
        }
        debug!(image_id = %image, locales = self.locales.len(), "synced alt text to locales");
        Ok(())
    }
}

/// Pick the language sync for a host exposing `locales`.
///
/// Fewer than two distinct locales means there is nothing to propagate.
pub fn detect_language_sync(locales: &[String]) -> Arc<dyn LanguageSync> {
    let mut distinct: Vec<String> = Vec::new();
    for locale in locales {
        let locale = locale.trim().to_ascii_lowercase();
        if !locale.is_empty() && !distinct.contains(&locale) {
            distinct.push(locale);
        }
    }
    if distinct.len() < 2 {
        Arc::new(NoLanguageSync)
    } else {
        Arc::new(LocaleFanout::new(distinct))
    }
}
