//! Retry decorator for text generators

use super::{Generation, TextGenerator};
use crate::errors::{AppError, Result};
use crate::metrics;
use crate::retry::{retry_transient, RetryPolicy};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

/// Wraps a generator with per-attempt timeouts and jittered backoff.
///
/// Only transient failures (timeouts, transport errors) are retried.
pub struct RetryingGenerator {
    inner: Arc<dyn TextGenerator>,
    policy: RetryPolicy,
}

impl RetryingGenerator {
    pub fn new(inner: Arc<dyn TextGenerator>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    async fn attempt(&self, prompt: &str, max_output_tokens: u32) -> Result<Generation> {
        let timeout = self.policy.attempt_timeout;
        match tokio::time::timeout(timeout, self.inner.generate(prompt, max_output_tokens)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::GenerationTimeout {
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }
}

#[async_trait]
impl TextGenerator for RetryingGenerator {
    async fn generate(&self, prompt: &str, max_output_tokens: u32) -> Result<Generation> {
        let start = Instant::now();
        let (result, attempts) = retry_transient(&self.policy, self.inner.model_name(), || {
            self.attempt(prompt, max_output_tokens)
        })
        .await;

        metrics::record_generation(
            start.elapsed().as_secs_f64(),
            self.inner.model_name(),
            attempts,
            result.as_ref().ok(),
        );

        result
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}
