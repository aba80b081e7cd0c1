//! Enrichment configuration.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. explicit path (e.g. `--config <path>`)
//! 2. `~/.huginn/config.toml` (user)
//! 3. `/etc/huginn/config.toml` (system)
//!
//! The API credential may also come from the environment
//! (`HUGINN_API_KEY`, then `OPENAI_API_KEY`), which overrides the file.
//!
//! The service never caches a config snapshot: it asks its
//! [`ConfigProvider`] on every call, so [`SharedConfig::update`] takes effect
//! for the next request.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::Deserialize;

use crate::{HuginnError, Result};

/// Environment variables consulted for the API credential, in order.
const API_KEY_ENV_VARS: &[&str] = &["HUGINN_API_KEY", "OPENAI_API_KEY"];

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Typed enrichment configuration.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// API credential (bearer token). `None` means enrichment is disabled.
    pub api_key: Option<String>,
    /// Base URL of the OpenAI-compatible API (default: `https://api.openai.com/v1`).
    pub base_url: String,
    /// Vision model identifier (default: `gpt-4o`).
    pub model: String,
    /// Per-request timeout in seconds (default: 30).
    pub timeout_secs: u64,
    /// Cap on generated output tokens (default: 300).
    pub max_tokens: u32,
    /// Cache lifetime in days (default: 30).
    pub cache_ttl_days: u64,
    /// Calls allowed per rate window (default: 50).
    pub rate_limit_per_window: usize,
    /// Rate window length in seconds (default: 60).
    pub rate_window_secs: u64,
    /// Target language code (default: `en`).
    pub language: String,
    /// Custom instruction template; may contain `{LANGUAGE}`.
    pub instruction_template: Option<String>,
    /// Items per batch chunk (default: 10).
    pub batch_chunk_size: usize,
    /// Largest batch accepted at the entry point (default: 50).
    pub batch_max_items: usize,
    /// Pause between batch chunks in milliseconds (default: 2000).
    pub batch_pause_ms: u64,
    /// Send remote images as inline data URIs rather than links (default: true).
    pub inline_remote_images: bool,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
            timeout_secs: 30,
            max_tokens: 300,
            cache_ttl_days: 30,
            rate_limit_per_window: 50,
            rate_window_secs: 60,
            language: "en".to_string(),
            instruction_template: None,
            batch_chunk_size: 10,
            batch_max_items: 50,
            batch_pause_ms: 2000,
            inline_remote_images: true,
        }
    }
}

impl fmt::Debug for EnrichmentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnrichmentConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_tokens", &self.max_tokens)
            .field("cache_ttl_days", &self.cache_ttl_days)
            .field("rate_limit_per_window", &self.rate_limit_per_window)
            .field("rate_window_secs", &self.rate_window_secs)
            .field("language", &self.language)
            .field("instruction_template", &self.instruction_template)
            .field("batch_chunk_size", &self.batch_chunk_size)
            .field("batch_max_items", &self.batch_max_items)
            .field("batch_pause_ms", &self.batch_pause_ms)
            .field("inline_remote_images", &self.inline_remote_images)
            .finish()
    }
}

impl EnrichmentConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the API credential.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the API base URL (used to point at a mock server in tests).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the model identifier.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the request timeout in seconds.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Set the output token cap.
    pub fn max_tokens(mut self, n: u32) -> Self {
        self.max_tokens = n;
        self
    }

    /// Set the cache lifetime in days.
    pub fn cache_ttl_days(mut self, days: u64) -> Self {
        self.cache_ttl_days = days;
        self
    }

    /// Set the rate limit (calls per window).
    pub fn rate_limit_per_window(mut self, n: usize) -> Self {
        self.rate_limit_per_window = n;
        self
    }

    /// Set the target language code.
    pub fn language(mut self, code: impl Into<String>) -> Self {
        self.language = code.into();
        self
    }

    /// Set a custom instruction template.
    pub fn instruction_template(mut self, template: impl Into<String>) -> Self {
        self.instruction_template = Some(template.into());
        self
    }

    /// Set the pause between batch chunks.
    pub fn batch_pause(mut self, pause: Duration) -> Self {
        self.batch_pause_ms = pause.as_millis() as u64;
        self
    }

    /// Set the largest accepted batch.
    pub fn batch_max_items(mut self, n: usize) -> Self {
        self.batch_max_items = n;
        self
    }

    /// Choose between inline data URIs and links for remote images.
    pub fn inline_remote_images(mut self, inline: bool) -> Self {
        self.inline_remote_images = inline;
        self
    }

    /// Cache lifetime as a [`Duration`].
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_days.saturating_mul(SECONDS_PER_DAY))
    }

    /// Request timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Rate window length as a [`Duration`].
    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rate_window_secs)
    }

    /// Pause between batch chunks as a [`Duration`].
    pub fn batch_pause_duration(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }

    /// The credential, if present and non-blank.
    pub fn credential(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided; must exist)
    /// 2. `~/.huginn/config.toml`
    /// 3. `/etc/huginn/config.toml`
    ///
    /// When no file is found and no explicit path was given, defaults are
    /// used. The environment credential is applied last.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut config = match Self::resolve_config_path(explicit_path)? {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Parse a single TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            HuginnError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        Self::from_toml(&content).map_err(|e| match e {
            HuginnError::Configuration(msg) => {
                HuginnError::Configuration(format!("{msg} (in {path:?})"))
            }
            other => other,
        })
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| HuginnError::Configuration(format!("Failed to parse config: {e}")))
    }

    /// Override the credential from the environment, if set.
    fn apply_env(&mut self) {
        for var in API_KEY_ENV_VARS {
            if let Ok(key) = std::env::var(var)
                && !key.trim().is_empty()
            {
                self.api_key = Some(key);
                return;
            }
        }
    }

    /// Resolve the config file path.
    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(HuginnError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        // User config
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".huginn").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        // System config
        let system_config = PathBuf::from("/etc/huginn/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }

        Ok(None)
    }
}

/// Source of the current configuration, consulted on every call.
pub trait ConfigProvider: Send + Sync {
    fn current(&self) -> EnrichmentConfig;
}

/// Live-updatable configuration shared between components.
///
/// Cloning is cheap; clones observe the same value.
#[derive(Clone, Default)]
pub struct SharedConfig {
    inner: Arc<RwLock<EnrichmentConfig>>,
}

impl SharedConfig {
    pub fn new(config: EnrichmentConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Replace the configuration.
    pub fn set(&self, config: EnrichmentConfig) {
        *self.inner.write().unwrap_or_else(|e| e.into_inner()) = config;
    }

    /// Mutate the configuration in place.
    pub fn update(&self, f: impl FnOnce(&mut EnrichmentConfig)) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        f(&mut guard);
    }
}

impl ConfigProvider for SharedConfig {
    fn current(&self) -> EnrichmentConfig {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl ConfigProvider for EnrichmentConfig {
    fn current(&self) -> EnrichmentConfig {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = EnrichmentConfig::default();
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.max_tokens, 300);
        assert_eq!(config.cache_ttl_days, 30);
        assert_eq!(config.rate_limit_per_window, 50);
        assert_eq!(config.rate_window(), Duration::from_secs(60));
        assert_eq!(config.language, "en");
        assert_eq!(config.batch_max_items, 50);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = EnrichmentConfig::from_toml(
            r#"
            language = "sv"
            cache_ttl_days = 7
            "#,
        )
        .unwrap();
        assert_eq!(config.language, "sv");
        assert_eq!(config.cache_ttl(), Duration::from_secs(7 * 86_400));
        assert_eq!(config.max_tokens, 300);
    }

    #[test]
    fn invalid_toml_is_configuration_error() {
        let err = EnrichmentConfig::from_toml("language = [").unwrap_err();
        assert!(matches!(err, HuginnError::Configuration(_)));
    }

    #[test]
    fn blank_credential_is_absent() {
        let config = EnrichmentConfig::new().api_key("   ");
        assert!(config.credential().is_none());
        let config = EnrichmentConfig::new().api_key("sk-test");
        assert_eq!(config.credential(), Some("sk-test"));
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = EnrichmentConfig::new().api_key("sk-secret");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn shared_config_updates_are_visible_to_clones() {
        let shared = SharedConfig::new(EnrichmentConfig::default());
        let reader = shared.clone();
        shared.update(|c| c.cache_ttl_days = 1);
        assert_eq!(reader.current().cache_ttl_days, 1);
    }

    #[test]
    fn missing_explicit_path_is_error() {
        let err = EnrichmentConfig::load(Some(Path::new("/nonexistent/huginn.toml"))).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
