//! Loreweaver Common Library
//!
//! Shared code for the Loreweaver services:
//! - Narrative pipeline (retrieval, generation, review)
//! - Session persistence
//! - Lore document stores and embedders
//! - Text generation clients
//! - Error types, configuration, metrics

pub mod config;
pub mod db;
pub mod documents;
pub mod embeddings;
pub mod errors;
pub mod llm;
pub mod metrics;
pub mod pipeline;
pub mod retry;
pub mod sessions;

// Re-export commonly used types
pub use config::AppConfig;
pub use documents::{DocumentStore, ScoredDocument};
pub use embeddings::Embedder;
pub use errors::{AppError, Result};
pub use llm::TextGenerator;
pub use pipeline::{NarrativeResponse, NarrativeService};
pub use sessions::SessionStore;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default text generation model
pub const DEFAULT_GENERATION_MODEL: &str = "claude-sonnet-4-20250514";

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Default embedding dimension
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 384;
