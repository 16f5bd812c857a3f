//! Catalog repository: candidate queries and single-field updates
//!
//! The controller only sees the [`CatalogRepository`] trait. The SQLite
//! implementation backs the service binary; tests inject mocks. A failed
//! write is reported distinctly from a missing entity — the controller's
//! decision to retain a pending result depends on it.

use crate::clients::title_clean::is_mangled;
use crate::types::{PipelineKind, SearchHints, WorkItem};
use async_trait::async_trait;
use sqlx::SqlitePool;
use thiserror::Error;

/// Catalog write/read errors
#[derive(Debug, Error)]
pub enum RepoError {
    /// The entity does not exist (distinct from a failed write)
    #[error("entity not found: {0}")]
    NotFound(String),

    /// The store rejected the operation
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Fetches the working set and applies approved updates. Stateless.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Entities matching the pipeline's candidate predicate, oldest first
    async fn list_candidates(
        &self,
        kind: PipelineKind,
        limit: usize,
    ) -> Result<Vec<WorkItem>, RepoError>;

    /// Apply a single-field update for one entity
    async fn update_field(&self, id: &str, field: &str, value: &str) -> Result<(), RepoError>;
}

/// SQLite-backed catalog repository
pub struct SqliteCatalog {
    pool: SqlitePool,
}

impl SqliteCatalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct BookRow {
    id: String,
    title: String,
    author: Option<String>,
    publisher: Option<String>,
    publication_year: Option<i32>,
    isbn: Option<String>,
    cover_url: Option<String>,
}

impl BookRow {
    fn into_work_item(self, kind: PipelineKind) -> WorkItem {
        let current_value = match kind {
            PipelineKind::Isbn => self.isbn.clone(),
            PipelineKind::Cover => self.cover_url.clone(),
            PipelineKind::Title => Some(self.title.clone()),
        };
        WorkItem {
            id: self.id,
            hints: SearchHints {
                isbn: self.isbn,
                title: Some(self.title),
                author: self.author,
                publisher: self.publisher,
                year: self.publication_year,
            },
            current_value,
        }
    }
}

#[async_trait]
impl CatalogRepository for SqliteCatalog {
    async fn list_candidates(
        &self,
        kind: PipelineKind,
        limit: usize,
    ) -> Result<Vec<WorkItem>, RepoError> {
        let query = match kind {
            PipelineKind::Isbn => {
                r#"
                SELECT id, title, author, publisher, publication_year, isbn, cover_url
                FROM books
                WHERE isbn IS NULL OR isbn = ''
                ORDER BY id
                LIMIT ?
                "#
            }
            PipelineKind::Cover => {
                r#"
                SELECT id, title, author, publisher, publication_year, isbn, cover_url
                FROM books
                WHERE cover_url IS NULL OR cover_url = ''
                ORDER BY id
                LIMIT ?
                "#
            }
            // SQL prefilters the substring and leading-character patterns;
            // the mangled-title heuristic below is authoritative ('_' needs
            // escaping in LIKE, and the GLOB arm over-selects accented first
            // letters).
            PipelineKind::Title => {
                r#"
                SELECT id, title, author, publisher, publication_year, isbn, cover_url
                FROM books
                WHERE title LIKE '%\_\_%' ESCAPE '\'
                   OR title LIKE '%??%'
                   OR title GLOB '[^A-Za-z0-9 ]*'
                ORDER BY id
                LIMIT ?
                "#
            }
        };

        let rows: Vec<BookRow> = sqlx::query_as(query)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        let items = rows
            .into_iter()
            .filter(|row| kind != PipelineKind::Title || is_mangled(&row.title))
            .map(|row| row.into_work_item(kind))
            .collect();

        Ok(items)
    }

    async fn update_field(&self, id: &str, field: &str, value: &str) -> Result<(), RepoError> {
        // Column names cannot be bound; map the known target fields to
        // static statements.
        let query = match field {
            "isbn" => "UPDATE books SET isbn = ? WHERE id = ?",
            "cover_url" => "UPDATE books SET cover_url = ? WHERE id = ?",
            "title" => "UPDATE books SET title = ? WHERE id = ?",
            other => {
                return Err(RepoError::Database(sqlx::Error::Protocol(format!(
                    "unknown target field: {}",
                    other
                ))))
            }
        };

        let result = sqlx::query(query)
            .bind(value)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound(id.to_string()));
        }

        Ok(())
    }
}
