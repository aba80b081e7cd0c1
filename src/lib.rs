//! Huginn - image alt-text enrichment over vision LLM APIs
//!
//! Huginn turns images into short, accessible descriptions. It puts a
//! content-addressed cache and a sliding-window rate limiter in front of an
//! OpenAI-compatible vision endpoint, records every generation in a
//! statistics log, and processes batches with per-item failure isolation.
//!
//! # Example
//!
//! ```rust,no_run
//! use huginn::{EnrichmentConfig, EnrichmentService, GenerationMode, ImageRef};
//!
//! #[tokio::main]
//! async fn main() -> huginn::Result<()> {
//!     let service = EnrichmentService::builder(
//!         EnrichmentConfig::new().api_key("sk-your-key").language("sv"),
//!     )
//!     .build()?;
//!
//!     let image = ImageRef::file(42u64, "photos/harbour.jpg");
//!     let result = service.generate(&image, GenerationMode::Manual, false).await?;
//!
//!     println!("{} ({} tokens)", result.text, result.tokens_used);
//!     Ok(())
//! }
//! ```
//!
//! # Batches
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use huginn::{BatchProcessor, EnrichmentConfig, EnrichmentService, ImageRef};
//!
//! # async fn run() -> huginn::Result<()> {
//! let service = Arc::new(EnrichmentService::builder(EnrichmentConfig::load(None)?).build()?);
//! let images: Vec<ImageRef> = (1..=20u64)
//!     .map(|id| ImageRef::file(id, format!("uploads/{id}.jpg")))
//!     .collect();
//!
//! let report = BatchProcessor::new(service).process(&images, 10).await?;
//! for id in report.failed() {
//!     eprintln!("retry later: {id}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod cache;
pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod limiter;
pub mod prompt;
pub mod resolve;
pub mod retry;
pub mod service;
pub mod stats;
pub mod sync;
pub mod telemetry;
pub mod types;
pub mod version;

// Re-export main types at crate root
pub use batch::{BatchOutcome, BatchProcessor, BatchReport};
pub use cache::{CacheKey, CacheStore, MemoryCacheStore};
pub use client::{ChatCompletionsClient, DescribeOptions, ImagePayload, VisionClient};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigProvider, EnrichmentConfig, SharedConfig};
pub use error::{HuginnError, Result};
pub use limiter::{RateLimitConfig, RateLimiter};
pub use resolve::{DefaultResolver, ImageResolver};
pub use retry::RetryConfig;
pub use service::{EnrichmentService, EnrichmentServiceBuilder};
pub use stats::{
    GenerationRecord, MemoryStatistics, NewRecord, Pricing, SqliteStatistics, StatisticsStore,
    StatsSummary,
};
pub use sync::{
    AltTextSink, LanguageSync, LocaleFanout, MemorySink, NoLanguageSync, SidecarSink,
    detect_language_sync,
};
pub use types::{
    Description, Enrichment, GenerationMode, ImageId, ImageRef, ImageSource, Improvement,
    ResolvedImage, Usage,
};
