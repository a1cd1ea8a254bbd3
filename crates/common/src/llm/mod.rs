//! Text generation clients
//!
//! The pipeline treats generation as a stateless request/response call:
//! a prompt and an output ceiling go in, text and token usage come out.
//! Providers:
//! - Anthropic messages API
//! - OpenAI-compatible chat completions
//! - Echo (offline, deterministic)
//!
//! `RetryingGenerator` wraps any provider with per-attempt timeouts and
//! bounded, jittered exponential backoff.

mod providers;
mod retry;

pub use providers::{AnthropicGenerator, EchoGenerator, OpenAiGenerator};
pub use crate::retry::RetryPolicy;
pub use retry::RetryingGenerator;

use crate::config::GenerationConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Output of one generation call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generation {
    pub text: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Stateless text completion service
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Complete `prompt`, producing at most `max_output_tokens` tokens
    async fn generate(&self, prompt: &str, max_output_tokens: u32) -> Result<Generation>;

    /// Model identifier
    fn model_name(&self) -> &str;
}

/// Build the configured generator, wrapped in the retry policy
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn TextGenerator>> {
    let timeout = Duration::from_secs(config.timeout_secs);

    let inner: Arc<dyn TextGenerator> = match config.provider.as_str() {
        "anthropic" => Arc::new(AnthropicGenerator::new(
            require_key(config)?,
            config.model.clone(),
            config.api_base.clone(),
            timeout,
        )?),
        "openai" => Arc::new(OpenAiGenerator::new(
            require_key(config)?,
            config.model.clone(),
            config.api_base.clone(),
            timeout,
        )?),
        "echo" => Arc::new(EchoGenerator::default()),
        other => {
            return Err(AppError::Configuration {
                message: format!("Unknown generation provider '{}'", other),
            })
        }
    };

    let policy = RetryPolicy {
        max_retries: config.max_retries,
        initial_backoff: Duration::from_millis(config.backoff_initial_ms),
        attempt_timeout: timeout,
        ..RetryPolicy::default()
    };

    Ok(Arc::new(RetryingGenerator::new(inner, policy)))
}

fn require_key(config: &GenerationConfig) -> Result<String> {
    config
        .api_key
        .clone()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| AppError::Configuration {
            message: format!("{} API key required", config.provider),
        })
}
