//! Configuration management for Loreweaver services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::{AppError, Result};

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// On-disk locations for sessions and lore
    #[serde(default)]
    pub storage: StorageConfig,

    /// Text generation service configuration
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Embedding service configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Lore document store configuration
    #[serde(default)]
    pub documents: DocumentsConfig,

    /// Database configuration (pgvector document backend)
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Pipeline policy constants
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Session handle cache
    #[serde(default)]
    pub sessions: SessionCacheConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Maximum concurrent requests
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Directory holding one JSON document per session
    #[serde(default = "default_sessions_dir")]
    pub sessions_dir: PathBuf,

    /// Directory of `*.md` lore files
    #[serde(default = "default_lore_dir")]
    pub lore_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenerationConfig {
    /// Generator provider: anthropic, openai, echo
    #[serde(default = "default_generation_provider")]
    pub provider: String,

    /// API key for the generation service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_generation_model")]
    pub model: String,

    /// Output-length ceiling per call
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    /// Per-attempt timeout in seconds
    #[serde(default = "default_external_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries after the first attempt
    #[serde(default = "default_generation_retries")]
    pub max_retries: u32,

    /// Initial backoff delay in milliseconds
    #[serde(default = "default_backoff_initial_ms")]
    pub backoff_initial_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: openai, hashing
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key for embedding service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_external_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,

    /// Batch size for embedding requests
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DocumentsConfig {
    /// Document backend: memory, pgvector
    #[serde(default = "default_documents_backend")]
    pub backend: String,

    /// Query timeout in seconds
    #[serde(default = "default_external_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database URL
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Documents retrieved per run
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Characters kept from each retrieved document
    #[serde(default = "default_excerpt_chars")]
    pub excerpt_chars: usize,

    /// Messages of history handed to the narrator
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Longest accepted user input, in characters
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,

    /// Setting named in the narrator and reviewer prompts
    #[serde(default = "default_universe")]
    pub universe: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionCacheConfig {
    /// Maximum cached session handles
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: u64,

    /// Evict handles idle for this long, in seconds
    #[serde(default = "default_cache_idle")]
    pub cache_idle_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second (global)
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8000 }
fn default_request_timeout() -> u64 { 120 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_max_concurrent() -> usize { 64 }
fn default_sessions_dir() -> PathBuf { PathBuf::from("sessions") }
fn default_lore_dir() -> PathBuf { PathBuf::from("lore") }
fn default_generation_provider() -> String { "anthropic".to_string() }
fn default_generation_model() -> String { crate::DEFAULT_GENERATION_MODEL.to_string() }
fn default_max_output_tokens() -> u32 { 600 }
fn default_external_timeout() -> u64 { 30 }
fn default_generation_retries() -> u32 { 2 }
fn default_backoff_initial_ms() -> u64 { 250 }
fn default_embedding_provider() -> String { "hashing".to_string() }
fn default_embedding_model() -> String { crate::DEFAULT_EMBEDDING_MODEL.to_string() }
fn default_embedding_dimension() -> usize { crate::DEFAULT_EMBEDDING_DIMENSION }
fn default_embedding_retries() -> u32 { 3 }
fn default_batch_size() -> usize { 16 }
fn default_documents_backend() -> String { "memory".to_string() }
fn default_database_url() -> String { "postgres://localhost/loreweaver".to_string() }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_top_k() -> usize { 3 }
fn default_excerpt_chars() -> usize { 1200 }
fn default_history_window() -> usize { 6 }
fn default_max_input_chars() -> usize { 4000 }
fn default_universe() -> String { "DOAMMO".to_string() }
fn default_cache_capacity() -> u64 { 1024 }
fn default_cache_idle() -> u64 { 1800 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "loreweaver".to_string() }
fn default_rate_limit() -> u32 { 10 }
fn default_burst() -> u32 { 20 }
fn default_enabled() -> bool { true }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            max_concurrent_requests: default_max_concurrent(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sessions_dir: default_sessions_dir(),
            lore_dir: default_lore_dir(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            api_key: None,
            api_base: None,
            model: default_generation_model(),
            max_output_tokens: default_max_output_tokens(),
            timeout_secs: default_external_timeout(),
            max_retries: default_generation_retries(),
            backoff_initial_ms: default_backoff_initial_ms(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            api_base: None,
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_external_timeout(),
            max_retries: default_embedding_retries(),
            batch_size: default_batch_size(),
        }
    }
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            backend: default_documents_backend(),
            timeout_secs: default_external_timeout(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            excerpt_chars: default_excerpt_chars(),
            history_window: default_history_window(),
            max_input_chars: default_max_input_chars(),
            universe: default_universe(),
        }
    }
}

impl Default for SessionCacheConfig {
    fn default() -> Self {
        Self {
            cache_capacity: default_cache_capacity(),
            cache_idle_secs: default_cache_idle(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            enabled: default_enabled(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            generation: GenerationConfig::default(),
            embedding: EmbeddingConfig::default(),
            documents: DocumentsConfig::default(),
            database: DatabaseConfig::default(),
            pipeline: PipelineConfig::default(),
            sessions: SessionCacheConfig::default(),
            observability: ObservabilityConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> std::result::Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__GENERATION__API_KEY=sk-...
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> std::result::Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        config.try_deserialize()
    }

    /// Check startup requirements; a failure here must halt the process
    pub fn validate(&self) -> Result<()> {
        let needs_key = matches!(self.generation.provider.as_str(), "anthropic" | "openai");
        let has_key = self
            .generation
            .api_key
            .as_deref()
            .is_some_and(|k| !k.trim().is_empty());
        if needs_key && !has_key {
            return Err(AppError::Configuration {
                message: format!(
                    "generation provider '{}' requires APP__GENERATION__API_KEY",
                    self.generation.provider
                ),
            });
        }

        if self.embedding.provider == "openai" && self.embedding.api_key.is_none() {
            return Err(AppError::Configuration {
                message: "embedding provider 'openai' requires APP__EMBEDDING__API_KEY".to_string(),
            });
        }

        if self.storage.sessions_dir.as_os_str().is_empty() {
            return Err(AppError::Configuration {
                message: "storage.sessions_dir must not be empty".to_string(),
            });
        }

        if self.documents.backend == "memory" && self.storage.lore_dir.as_os_str().is_empty() {
            return Err(AppError::Configuration {
                message: "storage.lore_dir must not be empty for the memory backend".to_string(),
            });
        }

        if self.pipeline.top_k == 0 || self.pipeline.excerpt_chars == 0 {
            return Err(AppError::Configuration {
                message: "pipeline.top_k and pipeline.excerpt_chars must be positive".to_string(),
            });
        }

        Ok(())
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }

    /// Get the document store query timeout as Duration
    pub fn documents_timeout(&self) -> Duration {
        Duration::from_secs(self.documents.timeout_secs)
    }
}
