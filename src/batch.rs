//! Chunked batch enrichment.
//!
//! A batch is validated as a whole, then processed item by item in list
//! order. A failing item is recorded against its id and the batch moves on;
//! only invalid input fails the call itself. Chunks are separated by a
//! pause taken from the current configuration.
//!
//! Batches are in-memory only. If the process stops mid-batch the
//! unfinished items are simply not processed; callers resubmit them.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::service::EnrichmentService;
use crate::telemetry;
use crate::types::{GenerationMode, ImageId, ImageRef};
use crate::{HuginnError, Result};

/// Error message recorded for items skipped by cancellation.
pub const CANCELLED_MESSAGE: &str = "cancelled";

/// Outcome of one batch item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchOutcome {
    Succeeded { text: String, tokens: u32 },
    Failed { error: String },
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, BatchOutcome::Succeeded { .. })
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            BatchOutcome::Succeeded { text, .. } => Some(text),
            BatchOutcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            BatchOutcome::Succeeded { .. } => None,
            BatchOutcome::Failed { error } => Some(error),
        }
    }
}

/// Outcomes keyed by image id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchReport {
    outcomes: BTreeMap<ImageId, BatchOutcome>,
}

impl BatchReport {
    pub fn get(&self, id: &ImageId) -> Option<&BatchOutcome> {
        self.outcomes.get(id)
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ImageId, &BatchOutcome)> {
        self.outcomes.iter()
    }

    /// Ids that produced text.
    pub fn succeeded(&self) -> Vec<&ImageId> {
        self.outcomes
            .iter()
            .filter(|(_, o)| o.is_success())
            .map(|(id, _)| id)
            .collect()
    }

    /// Ids that failed, for selective resubmission.
    pub fn failed(&self) -> Vec<&ImageId> {
        self.outcomes
            .iter()
            .filter(|(_, o)| !o.is_success())
            .map(|(id, _)| id)
            .collect()
    }

    /// Total tokens spent by successful items.
    pub fn tokens_used(&self) -> u64 {
        self.outcomes
            .values()
            .map(|o| match o {
                BatchOutcome::Succeeded { tokens, .. } => u64::from(*tokens),
                BatchOutcome::Failed { .. } => 0,
            })
            .sum()
    }

    pub fn into_inner(self) -> BTreeMap<ImageId, BatchOutcome> {
        self.outcomes
    }

    fn insert(&mut self, id: ImageId, outcome: BatchOutcome) {
        self.outcomes.insert(id, outcome);
    }
}

/// Runs batches through an [`EnrichmentService`].
#[derive(Clone)]
pub struct BatchProcessor {
    service: Arc<EnrichmentService>,
    mode: GenerationMode,
}

impl BatchProcessor {
    pub fn new(service: Arc<EnrichmentService>) -> Self {
        Self {
            service,
            mode: GenerationMode::Batch,
        }
    }

    /// Record items under `mode` instead of `batch`.
    pub fn with_mode(mut self, mode: GenerationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Process `images` in chunks of `chunk_size`.
    pub async fn process(&self, images: &[ImageRef], chunk_size: usize) -> Result<BatchReport> {
        self.process_with_cancel(images, chunk_size, CancellationToken::new())
            .await
    }

    /// Like [`process`](Self::process), stopping early once `cancel` fires.
    ///
    /// The token is checked before each item and during the pause between
    /// chunks; an in-flight request always completes. Items never attempted
    /// are reported as failed with [`CANCELLED_MESSAGE`].
    #[instrument(skip(self, images, cancel), fields(items = images.len(), mode = %self.mode))]
    pub async fn process_with_cancel(
        &self,
        images: &[ImageRef],
        chunk_size: usize,
        cancel: CancellationToken,
    ) -> Result<BatchReport> {
        let config = self.service.config();
        validate(images, chunk_size, config.batch_max_items)?;

        let pause = config.batch_pause_duration();
        let chunks = images.chunks(chunk_size).count();
        let mut report = BatchReport::default();
        let mut cancelled = false;

        for (index, chunk) in images.chunks(chunk_size).enumerate() {
            for image in chunk {
                if cancelled || cancel.is_cancelled() {
                    cancelled = true;
                    report.insert(
                        image.id.clone(),
                        BatchOutcome::Failed {
                            error: HuginnError::Cancelled.to_string(),
                        },
                    );
                    continue;
                }
                let outcome = self.process_one(image).await;
                report.insert(image.id.clone(), outcome);
            }

            let last = index + 1 == chunks;
            if !last && !cancelled && !pause.is_zero() {
                debug!(
                    chunk = index + 1,
                    chunks,
                    pause_ms = pause.as_millis() as u64,
                    "pausing between chunks"
                );
                tokio::select! {
                    _ = cancel.cancelled() => cancelled = true,
                    _ = tokio::time::sleep(pause) => {}
                }
            }
        }

        info!(
            succeeded = report.succeeded().len(),
            failed = report.failed().len(),
            cancelled,
            "batch finished"
        );
        Ok(report)
    }

    async fn process_one(&self, image: &ImageRef) -> BatchOutcome {
        match self.service.generate(image, self.mode.clone(), false).await {
            Ok(enrichment) => {
                metrics::counter!(telemetry::BATCH_ITEMS_TOTAL, "status" => "ok").increment(1);
                BatchOutcome::Succeeded {
                    text: enrichment.text,
                    tokens: enrichment.tokens_used,
                }
            }
            Err(e) => {
                metrics::counter!(telemetry::BATCH_ITEMS_TOTAL, "status" => "error").increment(1);
                warn!(image_id = %image.id, error = %e, "batch item failed");
                BatchOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }
}

fn validate(images: &[ImageRef], chunk_size: usize, max_items: usize) -> Result<()> {
    if images.is_empty() {
        return Err(HuginnError::InvalidInput("batch is empty".into()));
    }
    if chunk_size == 0 {
        return Err(HuginnError::InvalidInput("chunk size must be positive".into()));
    }
    if images.len() > max_items {
        return Err(HuginnError::InvalidInput(format!(
            "batch of {} items exceeds the limit of {max_items}",
            images.len()
        )));
    }
    Ok(())
}
