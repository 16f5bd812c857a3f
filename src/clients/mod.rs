//! External lookup adapters
//!
//! The controller only sees the [`LookupClient`] trait. Adapters must surface
//! throttling as [`LookupError::RateLimited`] — a distinct variant, never a
//! message to be string-matched — and must not retry on their own; pacing
//! and retry policy belong entirely to the controller.

pub mod google_books;
pub mod title_clean;

use crate::types::{LookupResult, SearchHints};
use async_trait::async_trait;
use thiserror::Error;

/// Lookup adapter errors.
///
/// "Provider has no match" is not an error: it is `Ok` with
/// [`LookupResult::miss`]. Errors here mean the call itself went wrong.
#[derive(Debug, Error)]
pub enum LookupError {
    /// The provider is throttling us; the run must halt immediately
    #[error("provider rate limit exceeded")]
    RateLimited,

    /// Network failure or per-call timeout; treated as no-match for the run
    #[error("transient lookup error: {0}")]
    Transient(String),

    /// Unexpected provider response
    #[error("provider error {status}: {message}")]
    Provider { status: u16, message: String },
}

/// One external lookup per work item. Stateless; no retries.
#[async_trait]
pub trait LookupClient: Send + Sync {
    async fn lookup(&self, hints: &SearchHints) -> Result<LookupResult, LookupError>;
}
