//! Table creation for the catalog and progress stores

use anyhow::Result;
use sqlx::SqlitePool;

/// Create service tables if they don't exist
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS books (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            author TEXT,
            publisher TEXT,
            publication_year INTEGER,
            isbn TEXT,
            cover_url TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Pending lookup results that survived a run interruption. Keyed by
    // (pipeline, item_id) so the three pipelines never share a namespace.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS enrichment_progress (
            pipeline TEXT NOT NULL,
            item_id TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (pipeline, item_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (books, enrichment_progress)");

    Ok(())
}
