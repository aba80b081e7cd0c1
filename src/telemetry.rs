//! Telemetry metric name constants.
//!
//! Centralised metric names for huginn operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `huginn_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `mode`: generation type (e.g. "manual", "batch", "api")
//! - `status`: outcome: "ok" or "error"
//! - `kind`: error kind (see [`HuginnError::kind`](crate::HuginnError::kind))

/// Total describe requests sent to the vision API.
///
/// Labels: `status` ("ok" | "error").
pub const REQUESTS_TOTAL: &str = "huginn_requests_total";

/// Describe request duration in seconds.
pub const REQUEST_DURATION_SECONDS: &str = "huginn_request_duration_seconds";

/// Total tokens reported by the API.
pub const TOKENS_TOTAL: &str = "huginn_tokens_total";

/// Requests refused by the local rate window before any network I/O.
pub const RATE_LIMITED_TOTAL: &str = "huginn_rate_limited_total";

/// Total retry attempts (not counting the initial request).
///
/// Labels: `kind`.
pub const RETRIES_TOTAL: &str = "huginn_retries_total";

/// Description cache hits.
///
/// Labels: `mode`.
pub const CACHE_HITS_TOTAL: &str = "huginn_cache_hits_total";

/// Description cache misses.
///
/// Labels: `mode`.
pub const CACHE_MISSES_TOTAL: &str = "huginn_cache_misses_total";

/// Batch items processed.
///
/// Labels: `status` ("ok" | "error").
pub const BATCH_ITEMS_TOTAL: &str = "huginn_batch_items_total";

/// Statistics rows that could not be written (swallowed).
pub const STATS_WRITE_FAILURES_TOTAL: &str = "huginn_stats_write_failures_total";
