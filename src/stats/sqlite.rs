//! SQLite-backed statistics log.
//!
//! rusqlite is synchronous, so every statement runs on tokio's blocking
//! pool while holding the connection mutex.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Connection, Row, params};
use tracing::{debug, info};

use super::{GenerationRecord, NewRecord, RecentRecord, StatisticsStore, StatsSummary};
use crate::types::{GenerationMode, ImageId};
use crate::{HuginnError, Result};

const SELECT_RECENT: &str = "
    SELECT g.id, g.image_id, g.generated_text, g.tokens_used, g.generation_type,
           g.generation_time, g.is_applied, g.is_edited, g.edited_text, g.applied_at,
           (SELECT COUNT(*) FROM generations g2
             WHERE g2.image_id = g.image_id AND g2.id <= g.id) AS update_number
      FROM generations g
     ORDER BY g.id DESC
     LIMIT ?1";

/// Statistics stored in a single SQLite table.
pub struct SqliteStatistics {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStatistics {
    /// Open (or create) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                HuginnError::Storage(format!("failed to create {}: {e}", parent.display()))
            })?;
        }
        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "opened statistics database");
        Self::from_connection(conn)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS generations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                image_id TEXT NOT NULL,
                generated_text TEXT NOT NULL,
                tokens_used INTEGER NOT NULL DEFAULT 0,
                generation_type TEXT NOT NULL,
                generation_time TEXT NOT NULL,
                is_applied INTEGER NOT NULL DEFAULT 0,
                is_edited INTEGER NOT NULL DEFAULT 0,
                edited_text TEXT,
                applied_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_generations_image ON generations(image_id);",
        )?;
        migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().unwrap_or_else(|e| e.into_inner());
            f(&mut guard)
        })
        .await
        .map_err(|e| HuginnError::Storage(format!("statistics task failed: {e}")))?
    }
}

/// Bring databases created by earlier versions up to the current schema.
fn migrate(conn: &Connection) -> Result<()> {
    let has_applied_at = conn
        .prepare("SELECT 1 FROM pragma_table_info('generations') WHERE name = 'applied_at'")?
        .exists([])?;
    if !has_applied_at {
        conn.execute("ALTER TABLE generations ADD COLUMN applied_at TEXT", [])?;
        info!("added applied_at column to statistics table");
    }
    Ok(())
}

fn recent_from_row(row: &Row<'_>) -> rusqlite::Result<RecentRecord> {
    let image_id: String = row.get(1)?;
    let mode: String = row.get(4)?;
    Ok(RecentRecord {
        record: GenerationRecord {
            id: row.get(0)?,
            image_id: ImageId::new(image_id),
            text: row.get(2)?,
            tokens_used: row.get(3)?,
            mode: GenerationMode::from(mode.as_str()),
            created_at: row.get(5)?,
            applied: row.get(6)?,
            edited: row.get(7)?,
            edited_text: row.get(8)?,
            applied_at: row.get(9)?,
        },
        update_number: row.get(10)?,
    })
}

#[async_trait]
impl StatisticsStore for SqliteStatistics {
    async fn record(&self, record: NewRecord) -> Result<i64> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO generations
                    (image_id, generated_text, tokens_used, generation_type,
                     generation_time, is_applied, is_edited, edited_text)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.image_id.as_str(),
                    record.text,
                    record.tokens_used,
                    record.mode.as_str(),
                    Utc::now(),
                    record.applied,
                    record.edited,
                    record.edited_text,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    async fn mark_applied(
        &self,
        image_id: &ImageId,
        original_text: &str,
        edited_text: Option<&str>,
    ) -> Result<bool> {
        let image_id = image_id.clone();
        let original_text = original_text.to_string();
        let edited_text = edited_text.map(str::to_string);
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE generations
                    SET is_applied = 1, is_edited = ?3, edited_text = ?4, applied_at = ?5
                  WHERE id = (SELECT id FROM generations
                               WHERE image_id = ?1 AND generated_text = ?2
                               ORDER BY id DESC LIMIT 1)
                    AND applied_at IS NULL",
                params![
                    image_id.as_str(),
                    original_text,
                    edited_text.is_some(),
                    edited_text,
                    Utc::now(),
                ],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn aggregate(&self, recent: usize) -> Result<StatsSummary> {
        self.with_conn(move |conn| {
            let (total, tokens, applied, edited): (i64, i64, i64, i64) = conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(tokens_used), 0),
                        COALESCE(SUM(is_applied), 0), COALESCE(SUM(is_edited), 0)
                   FROM generations",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )?;

            let mut summary = StatsSummary {
                total_generations: total as u64,
                total_tokens: tokens as u64,
                applied: applied as u64,
                edited: edited as u64,
                ..StatsSummary::default()
            };

            let mut stmt = conn.prepare(
                "SELECT generation_type, COUNT(*) FROM generations GROUP BY generation_type",
            )?;
            let types = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for entry in types {
                let (mode, count) = entry?;
                summary.by_type.insert(mode, count as u64);
            }

            let mut stmt = conn.prepare(SELECT_RECENT)?;
            let rows = stmt.query_map(params![recent as i64], recent_from_row)?;
            for row in rows {
                summary.recent.push(row?);
            }

            Ok(summary)
        })
        .await
    }

    async fn image_ids(&self) -> Result<Vec<ImageId>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT DISTINCT image_id FROM generations ORDER BY image_id")?;
            let ids = stmt.query_map([], |row| row.get::<_, String>(0))?;
            let mut out = Vec::new();
            for id in ids {
                out.push(ImageId::new(id?));
            }
            Ok(out)
        })
        .await
    }

    async fn delete_images(&self, ids: &[ImageId]) -> Result<u64> {
        let ids = ids.to_vec();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let mut removed = 0u64;
            {
                let mut stmt = tx.prepare("DELETE FROM generations WHERE image_id = ?1")?;
                for id in &ids {
                    removed += stmt.execute(params![id.as_str()])? as u64;
                }
            }
            tx.commit()?;
            Ok(removed)
        })
        .await
    }

    async fn truncate(&self) -> Result<u64> {
        self.with_conn(|conn| {
            let removed = conn.execute("DELETE FROM generations", [])?;
            Ok(removed as u64)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn update_numbers_count_per_image() {
        let stats = SqliteStatistics::open_in_memory().unwrap();
        for (id, text) in [("1", "a"), ("2", "b"), ("1", "c")] {
            stats
                .record(NewRecord::generated(id.into(), text, 10, GenerationMode::Manual))
                .await
                .unwrap();
        }

        let summary = stats.aggregate(10).await.unwrap();
        let numbers: Vec<(String, u32)> = summary
            .recent
            .iter()
            .map(|r| (r.record.text.clone(), r.update_number))
            .collect();
        assert_eq!(
            numbers,
            vec![("c".into(), 2), ("b".into(), 1), ("a".into(), 1)]
        );
    }

    #[tokio::test]
    async fn open_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("stats.db");
        let stats = SqliteStatistics::open(&path).unwrap();
        stats
            .record(NewRecord::generated("7".into(), "x", 1, GenerationMode::Cli))
            .await
            .unwrap();
        drop(stats);

        let reopened = SqliteStatistics::open(&path).unwrap();
        assert_eq!(reopened.aggregate(0).await.unwrap().total_generations, 1);
    }

    #[tokio::test]
    async fn older_schema_gains_applied_at() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE generations (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    image_id TEXT NOT NULL,
                    generated_text TEXT NOT NULL,
                    tokens_used INTEGER NOT NULL DEFAULT 0,
                    generation_type TEXT NOT NULL,
                    generation_time TEXT NOT NULL,
                    is_applied INTEGER NOT NULL DEFAULT 0,
                    is_edited INTEGER NOT NULL DEFAULT 0,
                    edited_text TEXT
                );
                INSERT INTO generations (image_id, generated_text, generation_type, generation_time)
                VALUES ('4', 'A fern.', 'upload', '2024-05-01T10:00:00+00:00');",
            )
            .unwrap();
        }

        let stats = SqliteStatistics::open(&path).unwrap();
        assert!(stats.mark_applied(&"4".into(), "A fern.", None).await.unwrap());
        let summary = stats.aggregate(1).await.unwrap();
        assert!(summary.recent[0].record.applied_at.is_some());
    }
}
