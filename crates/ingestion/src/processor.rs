//! Lore ingestion processor
//!
//! Reads a lore directory, skips documents whose content hash is already
//! stored, embeds the rest in batches and upserts them.

use crate::errors::IngestionError;
use loreweaver_common::documents::{content_hash, read_lore_dir, LoreDocument, PgVectorDocumentStore};
use loreweaver_common::embeddings::Embedder;
use loreweaver_common::metrics;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Outcome of one ingestion run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestionReport {
    pub scanned: usize,
    pub stored: usize,
    pub unchanged: usize,
}

/// Documents whose body hash differs from the stored one (or that are new)
pub fn select_changed(
    documents: Vec<LoreDocument>,
    stored_hashes: &HashMap<String, String>,
) -> Vec<LoreDocument> {
    documents
        .into_iter()
        .filter(|doc| stored_hashes.get(&doc.id) != Some(&content_hash(&doc.body)))
        .collect()
}

/// Lore ingestion processor
pub struct LoreIngestor {
    store: PgVectorDocumentStore,
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
}

impl LoreIngestor {
    pub fn new(store: PgVectorDocumentStore, embedder: Arc<dyn Embedder>, batch_size: usize) -> Self {
        Self {
            store,
            embedder,
            batch_size: batch_size.max(1),
        }
    }

    /// Ingest every `*.md` file in `dir`
    #[instrument(skip(self), fields(dir = %dir.display()))]
    pub async fn ingest_dir(&self, dir: &Path) -> Result<IngestionReport, IngestionError> {
        let documents = read_lore_dir(dir).await.map_err(|e| IngestionError::LoreDir {
            path: dir.display().to_string(),
            message: e.to_string(),
        })?;
        let scanned = documents.len();
        info!(scanned, "Lore files read");

        let mut stored_hashes = HashMap::new();
        for doc in &documents {
            if let Some(hash) = self.store.stored_hash(&doc.id).await? {
                stored_hashes.insert(doc.id.clone(), hash);
            }
        }

        let changed = select_changed(documents, &stored_hashes);
        let report = IngestionReport {
            scanned,
            stored: changed.len(),
            unchanged: scanned - changed.len(),
        };

        for batch in changed.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|d| d.body.clone()).collect();
            let embeddings = self.embedder.embed_batch(&texts).await?;
            if embeddings.len() != batch.len() {
                return Err(IngestionError::EmbeddingCount {
                    expected: batch.len(),
                    got: embeddings.len(),
                });
            }

            for (doc, embedding) in batch.iter().zip(&embeddings) {
                self.store.upsert(doc, embedding).await?;
                debug!(id = %doc.id, "Lore document stored");
            }
        }

        metrics::record_ingestion(report.stored, report.unchanged);
        info!(
            scanned = report.scanned,
            stored = report.stored,
            unchanged = report.unchanged,
            "Lore ingestion complete"
        );

        Ok(report)
    }
}
