//! In-memory statistics log, for tests and hosts without durable storage.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use super::{GenerationRecord, NewRecord, RecentRecord, StatisticsStore, StatsSummary};
use crate::Result;
use crate::types::ImageId;

#[derive(Default)]
struct Log {
    next_id: i64,
    rows: Vec<GenerationRecord>,
}

/// Statistics kept in a `Vec` behind a mutex.
#[derive(Default)]
pub struct MemoryStatistics {
    log: Mutex<Log>,
}

impl MemoryStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every row, oldest first.
    pub fn records(&self) -> Vec<GenerationRecord> {
        self.lock().rows.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Log> {
        self.log.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl StatisticsStore for MemoryStatistics {
    async fn record(&self, record: NewRecord) -> Result<i64> {
        let mut log = self.lock();
        log.next_id += 1;
        let id = log.next_id;
        log.rows.push(GenerationRecord {
            id,
            image_id: record.image_id,
            text: record.text,
            tokens_used: record.tokens_used,
            mode: record.mode,
            created_at: Utc::now(),
            applied: record.applied,
            edited: record.edited,
            edited_text: record.edited_text,
            applied_at: None,
        });
        Ok(id)
    }

    async fn mark_applied(
        &self,
        image_id: &ImageId,
        original_text: &str,
        edited_text: Option<&str>,
    ) -> Result<bool> {
        let mut log = self.lock();
        let Some(row) = log
            .rows
            .iter_mut()
            .rev()
            .find(|r| &r.image_id == image_id && r.text == original_text)
        else {
            return Ok(false);
        };
        if row.applied_at.is_some() {
            return Ok(false);
        }
        row.applied_at = Some(Utc::now());
        row.applied = true;
        row.edited = edited_text.is_some();
        row.edited_text = edited_text.map(str::to_string);
        Ok(true)
    }

    async fn aggregate(&self, recent: usize) -> Result<StatsSummary> {
        let log = self.lock();
        let mut summary = StatsSummary::default();
        let mut seen: HashMap<&ImageId, u32> = HashMap::new();
        let mut numbered = Vec::with_capacity(log.rows.len());

        for row in &log.rows {
            summary.total_generations += 1;
            summary.total_tokens += u64::from(row.tokens_used);
            summary.applied += u64::from(row.applied);
            summary.edited += u64::from(row.edited);
            *summary
                .by_type
                .entry(row.mode.as_str().to_string())
                .or_default() += 1;

            let n = seen.entry(&row.image_id).or_default();
            *n += 1;
            numbered.push(RecentRecord {
                record: row.clone(),
                update_number: *n,
            });
        }

        summary.recent = numbered.into_iter().rev().take(recent).collect();
        Ok(summary)
    }

    async fn image_ids(&self) -> Result<Vec<ImageId>> {
        let log = self.lock();
        let ids: BTreeSet<&ImageId> = log.rows.iter().map(|r| &r.image_id).collect();
        Ok(ids.into_iter().cloned().collect())
    }

    async fn delete_images(&self, ids: &[ImageId]) -> Result<u64> {
        let mut log = self.lock();
        let before = log.rows.len();
        log.rows.retain(|r| !ids.contains(&r.image_id));
        Ok((before - log.rows.len()) as u64)
    }

    async fn truncate(&self) -> Result<u64> {
        let mut log = self.lock();
        let removed = log.rows.len() as u64;
        log.rows.clear();
        Ok(removed)
    }
}
