//! Progress store: durable cache of uncommitted lookup results
//!
//! A run interrupted by a crash, restart or manual stop must not lose
//! lookups that completed but were never committed. The store is keyed by
//! (pipeline, item id); entries are evicted only after the corresponding
//! catalog write is confirmed.
//!
//! Store operations are best-effort from the controller's point of view: a
//! degraded store reduces resumability but never blocks a run.

use crate::types::PipelineKind;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use thiserror::Error;

/// Progress store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Durable key/value cache of pending results, namespaced per pipeline kind
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Idempotent upsert
    async fn put(&self, kind: PipelineKind, item_id: &str, value: &str)
        -> Result<(), StoreError>;

    async fn get(&self, kind: PipelineKind, item_id: &str) -> Result<Option<String>, StoreError>;

    /// Evict one entry. Called only after a confirmed catalog commit.
    async fn delete(&self, kind: PipelineKind, item_id: &str) -> Result<(), StoreError>;

    /// Number of entries held for one pipeline
    async fn count(&self, kind: PipelineKind) -> Result<usize, StoreError>;

    /// Drop every entry for one pipeline. Called only when a run completes
    /// with zero pending entries remaining.
    async fn clear(&self, kind: PipelineKind) -> Result<(), StoreError>;
}

/// SQLite-backed progress store
pub struct SqliteProgressStore {
    pool: SqlitePool,
}

impl SqliteProgressStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProgressStore for SqliteProgressStore {
    async fn put(
        &self,
        kind: PipelineKind,
        item_id: &str,
        value: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR REPLACE INTO enrichment_progress (pipeline, item_id, value, updated_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(kind.as_str())
        .bind(item_id)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, kind: PipelineKind, item_id: &str) -> Result<Option<String>, StoreError> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT value FROM enrichment_progress WHERE pipeline = ? AND item_id = ?",
        )
        .bind(kind.as_str())
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(value,)| value))
    }

    async fn delete(&self, kind: PipelineKind, item_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM enrichment_progress WHERE pipeline = ? AND item_id = ?")
            .bind(kind.as_str())
            .bind(item_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn count(&self, kind: PipelineKind) -> Result<usize, StoreError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM enrichment_progress WHERE pipeline = ?")
                .bind(kind.as_str())
                .fetch_one(&self.pool)
                .await?;

        Ok(count as usize)
    }

    async fn clear(&self, kind: PipelineKind) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM enrichment_progress WHERE pipeline = ?")
            .bind(kind.as_str())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
