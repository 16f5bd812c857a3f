//! SQLite access for the enrichment service

pub mod books;
pub mod progress;
pub mod schema;

use anyhow::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize the database connection pool, creating the file and tables
/// if missing.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // SQLite URI with mode=rwc (read, write, create)
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;

    schema::init_schema(&pool).await?;

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creates_database_file_and_parent_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("data").join("libris.db");

        let pool = init_database_pool(&db_path).await.expect("pool");
        assert!(db_path.exists());

        sqlx::query("INSERT INTO books (id, title) VALUES ('1', 'La colmena')")
            .execute(&pool)
            .await
            .expect("insert");
        let (title,): (String,) = sqlx::query_as("SELECT title FROM books WHERE id = '1'")
            .fetch_one(&pool)
            .await
            .expect("select");
        assert_eq!(title, "La colmena");
    }
}
