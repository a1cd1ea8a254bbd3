//! Loreweaver Ingestion
//!
//! Loads lore files into the pgvector document store:
//! 1. Ensures the `lore_documents` table exists
//! 2. Reads `*.md` files from the lore directory
//! 3. Embeds new or changed documents in batches
//! 4. Upserts them with their content hash
//!
//! Usage: `ingestion [LORE_DIR]` (defaults to `storage.lore_dir`).

mod errors;
mod processor;

use loreweaver_common::{
    config::AppConfig,
    db::DbPool,
    documents::PgVectorDocumentStore,
    embeddings::create_embedder,
    VERSION,
};
use processor::LoreIngestor;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load()?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .json()
        .init();

    info!("Starting Loreweaver Ingestion v{}", VERSION);

    let lore_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| config.storage.lore_dir.clone());

    let embedder = create_embedder(&config.embedding)?;

    // Initialize database connection
    let pool = DbPool::new(&config.database).await?;
    pool.ensure_schema(embedder.dimension()).await?;

    let store = PgVectorDocumentStore::new(pool, embedder.clone());
    let ingestor = LoreIngestor::new(store, embedder, config.embedding.batch_size);

    let report = ingestor.ingest_dir(&lore_dir).await?;
    info!(
        lore_dir = %lore_dir.display(),
        scanned = report.scanned,
        stored = report.stored,
        unchanged = report.unchanged,
        "Ingestion finished"
    );

    Ok(())
}
