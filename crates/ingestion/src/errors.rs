//! Ingestion error types

use loreweaver_common::errors::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("Lore directory error for {path}: {message}")]
    LoreDir { path: String, message: String },

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Embedder returned {got} vectors for {expected} documents")]
    EmbeddingCount { expected: usize, got: usize },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<AppError> for IngestionError {
    fn from(e: AppError) -> Self {
        match e {
            AppError::EmbeddingError { message } => IngestionError::Embedding(message),
            AppError::Configuration { message } => IngestionError::Config(message),
            other => IngestionError::Database(other.to_string()),
        }
    }
}
