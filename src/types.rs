//! Shared types and data contracts for the enrichment pipelines
//!
//! Defines the explicit contracts between the pipeline controller and its
//! collaborators: the catalog repository, the lookup clients and the
//! progress store.

use serde::{Deserialize, Serialize};

/// The three enrichment pipelines supported by the service.
///
/// Each kind defines its own candidate predicate, its target catalog field
/// and its own progress-store namespace. Kinds must never share pending
/// results: an ISBN found for a book is not a cover URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineKind {
    /// Fill in missing ISBNs from a title/author search
    Isbn,
    /// Fill in missing cover image URLs
    Cover,
    /// Repair mangled titles using the book's ISBN
    Title,
}

impl PipelineKind {
    /// Stable identifier, used for progress-store namespacing and routing
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Isbn => "isbn",
            Self::Cover => "cover",
            Self::Title => "title",
        }
    }

    /// Catalog column written by a successful commit
    pub fn target_field(self) -> &'static str {
        match self {
            Self::Isbn => "isbn",
            Self::Cover => "cover_url",
            Self::Title => "title",
        }
    }
}

impl std::fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PipelineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "isbn" => Ok(Self::Isbn),
            "cover" => Ok(Self::Cover),
            "title" => Ok(Self::Title),
            other => Err(format!("unknown pipeline kind: {}", other)),
        }
    }
}

/// Search hints used to query the external lookup provider
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchHints {
    pub isbn: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub publisher: Option<String>,
    pub year: Option<i32>,
}

/// One catalog entity awaiting enrichment.
///
/// Materialized from the catalog repository at run start and never mutated
/// in place; outcomes are recorded in the controller's run state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    /// Opaque, stable identifier into the catalog
    pub id: String,
    /// Fields used to query the external provider
    pub hints: SearchHints,
    /// Current value of the field being replaced, if any
    pub current_value: Option<String>,
}

/// Outcome of one external lookup call.
///
/// Invariant: `found == false` implies `value` is absent. Use the
/// [`LookupResult::hit`] / [`LookupResult::miss`] constructors to preserve it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupResult {
    pub found: bool,
    pub value: Option<String>,
    /// Provider-defined match confidence, when available
    pub confidence: Option<f64>,
}

impl LookupResult {
    pub fn hit(value: impl Into<String>) -> Self {
        Self {
            found: true,
            value: Some(value.into()),
            confidence: None,
        }
    }

    pub fn hit_with_confidence(value: impl Into<String>, confidence: f64) -> Self {
        Self {
            found: true,
            value: Some(value.into()),
            confidence: Some(confidence),
        }
    }

    pub fn miss() -> Self {
        Self {
            found: false,
            value: None,
            confidence: None,
        }
    }
}

/// Per-item resolution, as reported to operator-facing subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemOutcome {
    /// Lookup hit and catalog write confirmed
    Committed,
    /// Provider has no match; item is exhausted for this run
    NoMatch,
    /// Lookup hit but catalog write failed; pending result retained
    CommitFailed,
    /// Transient or provider error; treated as no-match for this run
    LookupFailed,
}

/// Events emitted during a run, fired on each item's resolution and once at
/// run end. Broadcast to SSE subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    RunStarted {
        run_id: uuid::Uuid,
        kind: PipelineKind,
        total_items: usize,
    },
    ItemStarted {
        run_id: uuid::Uuid,
        item_id: String,
    },
    ItemResolved {
        run_id: uuid::Uuid,
        item_id: String,
        outcome: ItemOutcome,
    },
    RunCompleted {
        run_id: uuid::Uuid,
        kind: PipelineKind,
        report: crate::models::RunReport,
    },
}

impl RunEvent {
    /// Event name used for the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run_started",
            Self::ItemStarted { .. } => "item_started",
            Self::ItemResolved { .. } => "item_resolved",
            Self::RunCompleted { .. } => "run_completed",
        }
    }
}
