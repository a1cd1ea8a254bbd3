//! Lore document stores
//!
//! A document store answers one question: which background documents are
//! nearest to this text? Results are ordered by ascending distance, so the
//! first entry is the most relevant. Backends:
//! - In-memory (embedded `*.md` lore files, brute-force cosine distance)
//! - pgvector (Postgres `lore_documents` table, `<=>` cosine distance)

mod memory;
mod pgvector;

pub use memory::{read_lore_dir, InMemoryDocumentStore};
pub use pgvector::{content_hash, PgVectorDocumentStore};

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::embeddings::Embedder;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A lore document before it is indexed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoreDocument {
    /// Stable identifier (file stem for vault documents)
    pub id: String,

    /// Human-readable attribution shown to the narrator (file name)
    pub source_label: String,

    /// Full document text
    pub body: String,
}

/// One nearest-neighbour hit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredDocument {
    pub document_id: String,
    pub body: String,
    pub source_label: String,

    /// Lower is more relevant
    pub distance: f32,
}

/// Nearest-k text similarity over a lore corpus
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Return up to `k` documents ordered by ascending distance to `text`
    async fn query(&self, text: &str, k: usize) -> Result<Vec<ScoredDocument>>;

    /// Number of indexed documents
    async fn count(&self) -> Result<usize>;

    /// Backend name for logs and health output
    fn backend_name(&self) -> &'static str;
}

/// Build the configured document store
pub async fn create_document_store(
    config: &AppConfig,
    embedder: Arc<dyn Embedder>,
) -> Result<Arc<dyn DocumentStore>> {
    match config.documents.backend.as_str() {
        "memory" => {
            let store = InMemoryDocumentStore::new(embedder);
            let loaded = store.load_dir(&config.storage.lore_dir).await?;
            if loaded == 0 {
                tracing::warn!(
                    lore_dir = %config.storage.lore_dir.display(),
                    "No lore documents found; every pipeline run will fail retrieval"
                );
            }
            Ok(Arc::new(store))
        }
        "pgvector" => {
            let pool = DbPool::new(&config.database).await?;
            Ok(Arc::new(PgVectorDocumentStore::new(pool, embedder)))
        }
        other => Err(AppError::Configuration {
            message: format!("Unknown document backend '{}'", other),
        }),
    }
}
