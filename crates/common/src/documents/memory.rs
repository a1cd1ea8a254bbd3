//! In-memory lore index with brute-force cosine distance

use super::{DocumentStore, LoreDocument, ScoredDocument};
use crate::embeddings::{cosine_distance, Embedder};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

struct IndexedDocument {
    document: LoreDocument,
    embedding: Vec<f32>,
}

/// Lore documents held in memory alongside their embeddings
pub struct InMemoryDocumentStore {
    embedder: Arc<dyn Embedder>,
    documents: RwLock<Vec<IndexedDocument>>,
}

impl InMemoryDocumentStore {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            documents: RwLock::new(Vec::new()),
        }
    }

    /// Embed and index documents, replacing any with the same id
    pub async fn insert(&self, documents: Vec<LoreDocument>) -> Result<usize> {
        if documents.is_empty() {
            return Ok(0);
        }

        let bodies: Vec<String> = documents.iter().map(|d| d.body.clone()).collect();
        let embeddings = self.embedder.embed_batch(&bodies).await?;
        if embeddings.len() != documents.len() {
            return Err(AppError::EmbeddingError {
                message: format!(
                    "Embedder returned {} vectors for {} documents",
                    embeddings.len(),
                    documents.len()
                ),
            });
        }

        let mut index = self.documents.write().await;
        let count = documents.len();
        for (document, embedding) in documents.into_iter().zip(embeddings) {
            index.retain(|d| d.document.id != document.id);
            index.push(IndexedDocument { document, embedding });
        }
        Ok(count)
    }

    /// Index every `*.md` file in `dir`; returns the number loaded
    pub async fn load_dir(&self, dir: &Path) -> Result<usize> {
        let documents = read_lore_dir(dir).await?;
        let count = self.insert(documents).await?;
        info!(lore_dir = %dir.display(), documents = count, "Lore index loaded");
        Ok(count)
    }
}

/// Read `*.md` files in name order; the file name is the source label
pub async fn read_lore_dir(dir: &Path) -> Result<Vec<LoreDocument>> {
    let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| AppError::Configuration {
        message: format!("Cannot read lore directory {}: {}", dir.display(), e),
    })?;

    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("md") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        let body = tokio::fs::read_to_string(&path).await?;
        let source_label = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        debug!(source = %source_label, chars = body.chars().count(), "Read lore file");
        documents.push(LoreDocument { id, source_label, body });
    }
    Ok(documents)
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn query(&self, text: &str, k: usize) -> Result<Vec<ScoredDocument>> {
        let query = self.embedder.embed(text).await?;
        let index = self.documents.read().await;

        let mut scored: Vec<ScoredDocument> = index
            .iter()
            .map(|d| ScoredDocument {
                document_id: d.document.id.clone(),
                body: d.document.body.clone(),
                source_label: d.document.source_label.clone(),
                distance: cosine_distance(&query, &d.embedding),
            })
            .collect();

        scored.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        scored.truncate(k);
        Ok(scored)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.documents.read().await.len())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
