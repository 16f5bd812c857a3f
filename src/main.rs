//! libris-enrich - Catalog enrichment service
//!
//! Runs batch enrichment pipelines over a librarian's book catalog:
//! - isbn: fill in missing ISBNs from title/author searches
//! - cover: fill in missing cover image URLs
//! - title: repair mangled titles using each book's ISBN
//!
//! Exposes an HTTP REST + SSE surface for the back-office UI.

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use libris_enrich::config::EnrichConfig;
use libris_enrich::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing; RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting libris-enrich");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = EnrichConfig::load()?;
    info!("Database: {}", config.database_path.display());

    let db_pool = libris_enrich::db::init_database_pool(&config.database_path).await?;
    info!("Database connection established");

    let bind_addr = config.bind_addr.clone();
    let state = AppState::new(db_pool, config)?;
    let app = libris_enrich::build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Listening on http://{}", bind_addr);
    info!("Health check: http://{}/health", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
