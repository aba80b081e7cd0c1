//! Tests for metrics emission.
//!
//! Uses `metrics_util::debugging::DebuggingRecorder` to capture and assert
//! on emitted metrics without needing a real exporter.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics_util::MetricKind;
use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use huginn::{
    BatchProcessor, ChatCompletionsClient, EnrichmentConfig, EnrichmentService, GenerationMode,
    HuginnError, ImageRef, ImageResolver, RateLimitConfig, RateLimiter, ResolvedImage, Result,
    RetryConfig, telemetry,
};

// ============================================================================
// Helpers
// ============================================================================

type SnapshotVec = Vec<(
    metrics_util::CompositeKey,
    Option<metrics::Unit>,
    Option<metrics::SharedString>,
    DebugValue,
)>;

/// Sum all counter values matching a given metric name.
fn counter_total(snapshot: &SnapshotVec, name: &str) -> u64 {
    snapshot
        .iter()
        .filter(|(key, _, _, _)| key.kind() == MetricKind::Counter && key.key().name() == name)
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(v) => *v,
            _ => 0,
        })
        .sum()
}

/// Sum counter values for `name` carrying label `label=value`.
fn counter_with_label(snapshot: &SnapshotVec, name: &str, label: &str, value: &str) -> u64 {
    snapshot
        .iter()
        .filter(|(key, _, _, _)| {
            key.kind() == MetricKind::Counter
                && key.key().name() == name
                && key
                    .key()
                    .labels()
                    .any(|l| l.key() == label && l.value() == value)
        })
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(v) => *v,
            _ => 0,
        })
        .sum()
}

fn has_histogram(snapshot: &SnapshotVec, name: &str) -> bool {
    snapshot
        .iter()
        .any(|(key, _, _, _)| key.kind() == MetricKind::Histogram && key.key().name() == name)
}

/// Resolves every id to its own name as PNG-labelled bytes; `missing` fails.
struct NamedResolver;

#[async_trait]
impl ImageResolver for NamedResolver {
    async fn resolve(&self, image: &ImageRef) -> Result<ResolvedImage> {
        if image.id.as_str() == "missing" {
            return Err(HuginnError::ImageSource("gone".into()));
        }
        Ok(ResolvedImage::new(
            image.id.as_str().as_bytes().to_vec(),
            "image/png",
        ))
    }
}

async fn mock_api(status: u16) -> MockServer {
    let server = MockServer::start().await;
    let body = serde_json::json!({
        "choices": [{ "message": { "content": "A quiet street." } }],
        "usage": { "prompt_tokens": 20, "completion_tokens": 5, "total_tokens": 25 }
    });
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(&server)
        .await;
    server
}

fn service(server: &MockServer, max_calls: usize) -> EnrichmentService {
    let limiter = Arc::new(RateLimiter::new(
        RateLimitConfig::new()
            .max_calls(max_calls)
            .window(Duration::from_secs(60)),
    ));
    let client = ChatCompletionsClient::with_base_url(server.uri(), limiter).unwrap();
    EnrichmentService::builder(
        EnrichmentConfig::new()
            .api_key("sk-test")
            .batch_pause(Duration::ZERO),
    )
    .client(Arc::new(client))
    .resolver(Arc::new(NamedResolver))
    .retry(RetryConfig::disabled())
    .build()
    .unwrap()
}

fn image(id: &str) -> ImageRef {
    ImageRef::file(id, format!("/srv/{id}.png"))
}

// ============================================================================
// Tests
// ============================================================================

/// Runs async code within a local recorder scope on the multi-thread runtime.
///
/// `block_in_place` ensures the sync `with_local_recorder` closure stays
/// on the current thread while `block_on` drives the inner async work.
#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn successful_request_records_metrics() {
    let server = mock_api(200).await;
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async {
                let service = service(&server, 10);
                service.generate(&image("a"), GenerationMode::Manual, false).await.unwrap();
                service.generate(&image("a"), GenerationMode::Manual, false).await.unwrap();
            })
        })
    });

    let snapshot = snapshotter.snapshot().into_vec();

    assert_eq!(
        counter_with_label(&snapshot, telemetry::REQUESTS_TOTAL, "status", "ok"),
        1
    );
    assert_eq!(counter_total(&snapshot, telemetry::TOKENS_TOTAL), 25);
    assert!(has_histogram(&snapshot, telemetry::REQUEST_DURATION_SECONDS));
    assert_eq!(
        counter_with_label(&snapshot, telemetry::CACHE_MISSES_TOTAL, "mode", "manual"),
        1
    );
    assert_eq!(
        counter_with_label(&snapshot, telemetry::CACHE_HITS_TOTAL, "mode", "manual"),
        1
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn failed_request_records_error_status() {
    let server = mock_api(500).await;
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    let result = metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async {
                service(&server, 10)
                    .generate(&image("a"), GenerationMode::Api, false)
                    .await
            })
        })
    });
    assert!(result.is_err());

    let snapshot = snapshotter.snapshot().into_vec();
    assert_eq!(
        counter_with_label(&snapshot, telemetry::REQUESTS_TOTAL, "status", "error"),
        1
    );
    assert_eq!(counter_total(&snapshot, telemetry::TOKENS_TOTAL), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn refused_call_records_rate_limited() {
    let server = mock_api(200).await;
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    let second = metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async {
                let service = service(&server, 1);
                service.generate(&image("a"), GenerationMode::Manual, false).await.unwrap();
                service.generate(&image("b"), GenerationMode::Manual, false).await
            })
        })
    });
    assert!(matches!(second, Err(HuginnError::RateLimited { .. })));

    let snapshot = snapshotter.snapshot().into_vec();
    assert_eq!(counter_total(&snapshot, telemetry::RATE_LIMITED_TOTAL), 1);
    assert_eq!(counter_total(&snapshot, telemetry::REQUESTS_TOTAL), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn batch_records_item_outcomes() {
    let server = mock_api(200).await;
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async {
                let processor = BatchProcessor::new(Arc::new(service(&server, 10)));
                processor
                    .process(&[image("a"), image("missing"), image("c")], 2)
                    .await
                    .unwrap();
            })
        })
    });

    let snapshot = snapshotter.snapshot().into_vec();
    assert_eq!(
        counter_with_label(&snapshot, telemetry::BATCH_ITEMS_TOTAL, "status", "ok"),
        2
    );
    assert_eq!(
        counter_with_label(&snapshot, telemetry::BATCH_ITEMS_TOTAL, "status", "error"),
        1
    );
    assert_eq!(
        counter_with_label(&snapshot, telemetry::CACHE_MISSES_TOTAL, "mode", "batch"),
        2
    );
}

#[tokio::test]
async fn metrics_are_noop_without_recorder() {
    // Verify no panics when no recorder is installed.
    let server = mock_api(200).await;
    service(&server, 10)
        .generate(&image("a"), GenerationMode::Manual, false)
        .await
        .unwrap();
}
