//! Huginn error types

use std::time::Duration;

/// Huginn error types
#[derive(Debug, thiserror::Error)]
pub enum HuginnError {
    // Configuration errors
    /// Missing or invalid credential / configuration. Needs operator action.
    #[error("configuration error: {0}")]
    Configuration(String),

    // Provider/network errors
    /// The local rate window is full. No network I/O was attempted.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("transport error: {0}")]
    Transport(String),

    /// Upstream rejected the request.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// 2xx response whose body lacked the expected fields.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    // Caller errors
    #[error("invalid input: {0}")]
    InvalidInput(String),

    // Image errors
    #[error("image source error: {0}")]
    ImageSource(String),

    /// No decoder for this encoding is compiled in, so it cannot be converted.
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("transcode error: {0}")]
    Transcode(String),

    // Persistence errors
    #[error("storage error: {0}")]
    Storage(String),

    /// The caller cancelled before the operation started.
    #[error("cancelled")]
    Cancelled,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HuginnError {
    /// Whether a caller-side retry may succeed without operator action.
    ///
    /// Transport failures and 5xx responses qualify. `RateLimited` is
    /// transient for the caller but is excluded here: it is surfaced, never
    /// retried automatically.
    pub fn is_transient(&self) -> bool {
        match self {
            HuginnError::Transport(_) => true,
            HuginnError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Retry hint carried by a `RateLimited` error.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            HuginnError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Short machine-friendly kind, used as a metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            HuginnError::Configuration(_) => "configuration",
            HuginnError::RateLimited { .. } => "rate_limited",
            HuginnError::Transport(_) => "transport",
            HuginnError::Api { .. } => "api",
            HuginnError::MalformedResponse(_) => "malformed_response",
            HuginnError::InvalidInput(_) => "invalid_input",
            HuginnError::ImageSource(_) => "image_source",
            HuginnError::UnsupportedFormat(_) => "unsupported_format",
            HuginnError::Transcode(_) => "transcode",
            HuginnError::Storage(_) => "storage",
            HuginnError::Cancelled => "cancelled",
            HuginnError::Json(_) => "json",
        }
    }
}

impl From<reqwest::Error> for HuginnError {
    fn from(err: reqwest::Error) -> Self {
        HuginnError::Transport(err.to_string())
    }
}

impl From<rusqlite::Error> for HuginnError {
    fn from(err: rusqlite::Error) -> Self {
        HuginnError::Storage(err.to_string())
    }
}

/// Result type alias for Huginn operations
pub type Result<T> = std::result::Result<T, HuginnError>;
