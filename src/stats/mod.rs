//! Generation statistics.
//!
//! An append-only audit log of every generation that produced text. Rows
//! are written once, updated once by an apply action, and deleted only by
//! orphan cleanup or truncation.
//!
//! Writes are best-effort from the enrichment service's point of view: a
//! failed write is logged and counted, never surfaced to the caller.

mod memory;
mod sqlite;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::types::{GenerationMode, ImageId};

pub use memory::MemoryStatistics;
pub use sqlite::SqliteStatistics;

/// Callback reporting whether an image still exists in the host.
pub type ImageExists = dyn Fn(&ImageId) -> bool + Send + Sync;

/// A row to append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    pub image_id: ImageId,
    pub text: String,
    pub tokens_used: u32,
    pub mode: GenerationMode,
    pub applied: bool,
    pub edited: bool,
    pub edited_text: Option<String>,
}

impl NewRecord {
    /// An unapplied, unedited row.
    pub fn generated(
        image_id: ImageId,
        text: impl Into<String>,
        tokens_used: u32,
        mode: GenerationMode,
    ) -> Self {
        Self {
            image_id,
            text: text.into(),
            tokens_used,
            mode,
            applied: false,
            edited: false,
            edited_text: None,
        }
    }

    pub fn applied(mut self, applied: bool) -> Self {
        self.applied = applied;
        self
    }
}

/// A stored row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub id: i64,
    pub image_id: ImageId,
    pub text: String,
    pub tokens_used: u32,
    pub mode: GenerationMode,
    pub created_at: DateTime<Utc>,
    pub applied: bool,
    pub edited: bool,
    pub edited_text: Option<String>,
    /// Set by the one apply action a row may receive.
    pub applied_at: Option<DateTime<Utc>>,
}

/// A recent row plus its ordinal among rows of the same image (1-based).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentRecord {
    #[serde(flatten)]
    pub record: GenerationRecord,
    pub update_number: u32,
}

/// Read-side rollup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSummary {
    pub total_generations: u64,
    pub total_tokens: u64,
    pub applied: u64,
    pub edited: u64,
    /// Generation count per mode tag.
    pub by_type: BTreeMap<String, u64>,
    /// Most recent rows, newest first.
    pub recent: Vec<RecentRecord>,
}

impl StatsSummary {
    pub fn average_tokens(&self) -> f64 {
        if self.total_generations == 0 {
            0.0
        } else {
            self.total_tokens as f64 / self.total_generations as f64
        }
    }

    /// Estimated spend for `total_tokens` under `pricing`.
    pub fn estimated_cost_usd(&self, pricing: &Pricing) -> f64 {
        pricing.cost_usd(self.total_tokens)
    }
}

/// Per-million-token prices used for cost estimates.
///
/// Usage rows carry only totals, so the split between input and output
/// tokens is approximated by `input_share`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    /// USD per million input tokens. Default: 2.50.
    pub input_per_million: f64,
    /// USD per million output tokens. Default: 10.00.
    pub output_per_million: f64,
    /// Fraction of tokens counted as input. Default: 0.7.
    pub input_share: f64,
}

impl Default for Pricing {
    fn default() -> Self {
        Self {
            input_per_million: 2.50,
            output_per_million: 10.00,
            input_share: 0.7,
        }
    }
}

impl Pricing {
    pub fn cost_usd(&self, total_tokens: u64) -> f64 {
        let total = total_tokens as f64;
        let share = self.input_share.clamp(0.0, 1.0);
        let input = total * share;
        let output = total - input;
        (input * self.input_per_million + output * self.output_per_million) / 1_000_000.0
    }
}

/// Durable generation log.
#[async_trait]
pub trait StatisticsStore: Send + Sync {
    /// Append a row. Returns its id.
    async fn record(&self, record: NewRecord) -> Result<i64>;

    /// Mark the latest row for `image_id` whose text is `original_text` as
    /// applied. `edited_text` is set when the applied text differs.
    ///
    /// A row is updated by apply at most once. Returns `false` when no row
    /// matches or the latest match was already applied by an earlier call.
    async fn mark_applied(
        &self,
        image_id: &ImageId,
        original_text: &str,
        edited_text: Option<&str>,
    ) -> Result<bool>;

    /// Totals plus the `recent` newest rows.
    async fn aggregate(&self, recent: usize) -> Result<StatsSummary>;

    /// Distinct image ids referenced by any row.
    async fn image_ids(&self) -> Result<Vec<ImageId>>;

    /// Delete every row for the given images. Returns rows removed.
    async fn delete_images(&self, ids: &[ImageId]) -> Result<u64>;

    /// Delete every row. Returns rows removed.
    async fn truncate(&self) -> Result<u64>;

    /// Number of distinct images referenced by rows but gone from the host.
    async fn orphaned_count(&self, exists: &ImageExists) -> Result<u64> {
        let ids = self.image_ids().await?;
        Ok(ids.iter().filter(|id| !exists(*id)).count() as u64)
    }

    /// Delete rows whose image is gone from the host. Returns rows removed.
    async fn cleanup_orphans(&self, exists: &ImageExists) -> Result<u64> {
        let orphans: Vec<ImageId> = self
            .image_ids()
            .await?
            .into_iter()
            .filter(|id| !exists(id))
            .collect();
        if orphans.is_empty() {
            return Ok(0);
        }
        self.delete_images(&orphans).await
    }
}
