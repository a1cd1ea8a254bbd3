//! pgvector-backed lore store
//!
//! Uses raw SQL for the vector column; `<=>` is cosine distance, which already
//! has the lower-is-closer orientation the pipeline expects.

use super::{DocumentStore, LoreDocument, ScoredDocument};
use crate::db::models::{LoreDocumentColumn, LoreDocumentEntity};
use crate::db::DbPool;
use crate::embeddings::Embedder;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DbBackend, EntityTrait, PaginatorTrait, QueryFilter,
    QueryResult, QuerySelect, Statement,
};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::debug;

/// Lore store over the `lore_documents` table
pub struct PgVectorDocumentStore {
    pool: DbPool,
    embedder: Arc<dyn Embedder>,
}

/// Convert Vec<f32> to pgvector string format "[1.0,2.0,...]"
fn to_vector_literal(embedding: &[f32]) -> String {
    format!(
        "[{}]",
        embedding.iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(",")
    )
}

/// Hex sha256 of a document body
pub fn content_hash(body: &str) -> String {
    hex::encode(Sha256::digest(body.as_bytes()))
}

impl PgVectorDocumentStore {
    pub fn new(pool: DbPool, embedder: Arc<dyn Embedder>) -> Self {
        Self { pool, embedder }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Stored content hash for a document id, if any
    pub async fn stored_hash(&self, id: &str) -> Result<Option<String>> {
        let hash = LoreDocumentEntity::find()
            .select_only()
            .column(LoreDocumentColumn::ContentHash)
            .filter(LoreDocumentColumn::Id.eq(id))
            .into_tuple::<String>()
            .one(self.pool.conn())
            .await?;
        Ok(hash)
    }

    /// Insert or replace a document with a precomputed embedding
    pub async fn upsert(&self, document: &LoreDocument, embedding: &[f32]) -> Result<()> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            INSERT INTO lore_documents (
                id, source_label, body, content_hash, embedding, embedding_model, updated_at
            )
            VALUES ($1, $2, $3, $4, $5::vector, $6, NOW())
            ON CONFLICT (id) DO UPDATE SET
                source_label = EXCLUDED.source_label,
                body = EXCLUDED.body,
                content_hash = EXCLUDED.content_hash,
                embedding = EXCLUDED.embedding,
                embedding_model = EXCLUDED.embedding_model,
                updated_at = NOW()
            "#,
            vec![
                document.id.clone().into(),
                document.source_label.clone().into(),
                document.body.clone().into(),
                content_hash(&document.body).into(),
                to_vector_literal(embedding).into(),
                self.embedder.model_name().to_string().into(),
            ],
        );

        self.pool.conn().execute(stmt).await?;
        debug!(id = %document.id, "Lore document upserted");
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for PgVectorDocumentStore {
    async fn query(&self, text: &str, k: usize) -> Result<Vec<ScoredDocument>> {
        let embedding = self.embedder.embed(text).await?;

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            SELECT
                id,
                body,
                source_label,
                (embedding <=> $1::vector)::float8 AS distance
            FROM lore_documents
            WHERE embedding IS NOT NULL
            ORDER BY embedding <=> $1::vector
            LIMIT $2
            "#,
            vec![to_vector_literal(&embedding).into(), (k as i64).into()],
        );

        let rows = self.pool.conn().query_all(stmt).await?;
        rows.into_iter().map(|row| scored_from_row(&row)).collect()
    }

    async fn count(&self) -> Result<usize> {
        let count = LoreDocumentEntity::find().count(self.pool.conn()).await?;
        Ok(count as usize)
    }

    fn backend_name(&self) -> &'static str {
        "pgvector"
    }
}

fn scored_from_row(row: &QueryResult) -> Result<ScoredDocument> {
    let malformed = |e: sea_orm::DbErr| AppError::Retrieval {
        message: format!("Malformed lore row: {}", e),
    };
    Ok(ScoredDocument {
        document_id: row.try_get_by_index::<String>(0).map_err(malformed)?,
        body: row.try_get_by_index::<String>(1).map_err(malformed)?,
        source_label: row.try_get_by_index::<String>(2).map_err(malformed)?,
        distance: row.try_get_by_index::<f64>(3).map_err(malformed)? as f32,
    })
}
