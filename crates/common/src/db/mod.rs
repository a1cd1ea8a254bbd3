//! Database layer for the pgvector lore backend
//!
//! Provides:
//! - SeaORM entity models
//! - Connection pool management
//! - Schema bootstrap for the `lore_documents` table

pub mod models;

use crate::config::DatabaseConfig;
use crate::errors::{AppError, Result};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection};
use std::time::Duration;
use tracing::info;

/// Database connection pool wrapper
#[derive(Clone)]
pub struct DbPool {
    pub primary: DatabaseConnection,
}

impl DbPool {
    /// Create a new database pool from configuration
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to lore database...");

        let mut opts = ConnectOptions::new(&config.url);
        opts
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .sqlx_logging(false);

        let primary = Database::connect(opts)
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Failed to connect to lore database: {}", e),
            })?;

        info!("Database connection established");

        Ok(Self { primary })
    }

    /// Get the connection
    pub fn conn(&self) -> &DatabaseConnection {
        &self.primary
    }

    /// Ping the database to check connectivity
    pub async fn ping(&self) -> Result<()> {
        self.primary
            .execute_unprepared("SELECT 1")
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Ping failed: {}", e),
            })?;
        Ok(())
    }

    /// Create the vector extension and lore table if missing
    pub async fn ensure_schema(&self, dimension: usize) -> Result<()> {
        self.primary
            .execute_unprepared("CREATE EXTENSION IF NOT EXISTS vector")
            .await?;

        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS lore_documents (
                id TEXT PRIMARY KEY,
                source_label TEXT NOT NULL,
                body TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                embedding vector({dimension}),
                embedding_model TEXT NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#
        );
        self.primary.execute_unprepared(&ddl).await?;
        Ok(())
    }
}
