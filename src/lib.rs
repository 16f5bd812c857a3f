//! libris-enrich library interface
//!
//! Batch catalog enrichment: three pipelines (ISBN completion, cover-image
//! search, title repair) driven by one sequential, rate-limit-aware,
//! resumable pipeline controller.

pub mod api;
pub mod clients;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod types;

pub use crate::error::{ApiError, ApiResult};

use crate::clients::google_books::{CoverLookup, GoogleBooksClient, IsbnLookup, TitleLookup};
use crate::clients::LookupClient;
use crate::config::EnrichConfig;
use crate::db::books::{CatalogRepository, SqliteCatalog};
use crate::db::progress::SqliteProgressStore;
use crate::models::EnrichmentRun;
use crate::pipeline::PipelineController;
use crate::types::{PipelineKind, RunEvent};
use anyhow::Result;
use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;

/// Event bus capacity for SSE broadcasting
const EVENT_BUS_CAPACITY: usize = 100;

/// One tracked run per pipeline kind: the shared status view plus its
/// cancellation token. Retained after the run finishes so status queries
/// keep answering until the next start replaces it.
#[derive(Clone)]
pub struct ActiveRun {
    pub run: Arc<RwLock<EnrichmentRun>>,
    pub cancel: CancellationToken,
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Event bus for SSE broadcasting
    pub event_tx: broadcast::Sender<RunEvent>,
    /// One controller per pipeline kind (each with its own lookup adapter)
    pub controllers: Arc<HashMap<PipelineKind, Arc<PipelineController>>>,
    /// Catalog repository, used by start handlers to build the working set
    pub catalog: Arc<dyn CatalogRepository>,
    /// Tracked runs, keyed by pipeline kind
    pub runs: Arc<RwLock<HashMap<PipelineKind, ActiveRun>>>,
    /// Resolved service configuration (pacing defaults, limits)
    pub config: Arc<EnrichConfig>,
    /// Service startup timestamp for uptime reporting
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool, config: EnrichConfig) -> Result<Self> {
        let (event_tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);

        let provider = Arc::new(GoogleBooksClient::new(config.provider_base_url.clone())?);
        let catalog: Arc<dyn CatalogRepository> = Arc::new(SqliteCatalog::new(db.clone()));
        let progress = Arc::new(SqliteProgressStore::new(db.clone()));

        let mut controllers: HashMap<PipelineKind, Arc<PipelineController>> = HashMap::new();
        for kind in [PipelineKind::Isbn, PipelineKind::Cover, PipelineKind::Title] {
            let lookup: Arc<dyn LookupClient> = match kind {
                PipelineKind::Isbn => Arc::new(IsbnLookup::new(provider.clone())),
                PipelineKind::Cover => Arc::new(CoverLookup::new(provider.clone())),
                PipelineKind::Title => Arc::new(TitleLookup::new(provider.clone())),
            };
            controllers.insert(
                kind,
                Arc::new(PipelineController::new(
                    lookup,
                    catalog.clone(),
                    progress.clone(),
                    event_tx.clone(),
                )),
            );
        }

        Ok(Self {
            db,
            event_tx,
            controllers: Arc::new(controllers),
            catalog,
            runs: Arc::new(RwLock::new(HashMap::new())),
            config: Arc::new(config),
            startup_time: Utc::now(),
        })
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post};

    Router::new()
        .route("/health", get(api::health::health))
        .route("/enrich/events", get(api::sse::event_stream))
        .route("/enrich/:kind/start", post(api::enrich::start_run))
        .route("/enrich/:kind/cancel", post(api::enrich::cancel_run))
        .route("/enrich/:kind/reset", post(api::enrich::reset_session))
        .route("/enrich/:kind/status", get(api::enrich::run_status))
        .with_state(state)
}
