//! Metrics and observability utilities
//!
//! Prometheus metrics for the narrative pipeline, named under a common
//! prefix. Recording is a no-op until a recorder is installed, so library
//! code can call these helpers unconditionally.

use crate::llm::Generation;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all Loreweaver metrics
pub const METRICS_PREFIX: &str = "loreweaver";

/// Histogram buckets for HTTP request latency (in seconds).
/// Narrative requests are dominated by two model calls, so the tail is long.
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005,  // 5ms
    0.025,  // 25ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
    20.00,  // 20s
    40.00,  // 40s
    60.00,  // 60s
];

/// Buckets for per-stage latency
pub const STAGE_BUCKETS: &[f64] = &[
    0.010,  // 10ms
    0.050,  // 50ms
    0.250,  // 250ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Pipeline metrics
    describe_counter!(
        format!("{}_pipeline_runs_total", METRICS_PREFIX),
        Unit::Count,
        "Total narrative pipeline runs by outcome"
    );

    describe_histogram!(
        format!("{}_pipeline_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end pipeline latency in seconds"
    );

    describe_histogram!(
        format!("{}_stage_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Pipeline stage latency in seconds"
    );

    describe_counter!(
        format!("{}_review_verdicts_total", METRICS_PREFIX),
        Unit::Count,
        "Quality review verdicts by kind"
    );

    // Retrieval metrics
    describe_gauge!(
        format!("{}_retrieval_results_count", METRICS_PREFIX),
        Unit::Count,
        "Number of lore documents returned by the last retrieval"
    );

    // Generation metrics
    describe_counter!(
        format!("{}_generation_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total text generation calls"
    );

    describe_counter!(
        format!("{}_generation_attempts_total", METRICS_PREFIX),
        Unit::Count,
        "Generation attempts including retries"
    );

    describe_counter!(
        format!("{}_generation_tokens_total", METRICS_PREFIX),
        Unit::Count,
        "Tokens consumed by text generation"
    );

    describe_histogram!(
        format!("{}_generation_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Text generation latency in seconds, retries included"
    );

    // Embedding metrics
    describe_counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API requests"
    );

    describe_histogram!(
        format!("{}_embedding_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Embedding generation latency in seconds"
    );

    describe_counter!(
        format!("{}_embedding_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API errors"
    );

    // Session metrics
    describe_counter!(
        format!("{}_session_writes_total", METRICS_PREFIX),
        Unit::Count,
        "Session mutations by operation"
    );

    describe_counter!(
        format!("{}_cache_hits_total", METRICS_PREFIX),
        Unit::Count,
        "Total cache hits"
    );

    describe_counter!(
        format!("{}_cache_misses_total", METRICS_PREFIX),
        Unit::Count,
        "Total cache misses"
    );

    // Ingestion metrics
    describe_counter!(
        format!("{}_lore_documents_ingested_total", METRICS_PREFIX),
        Unit::Count,
        "Lore documents embedded and stored"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Record one stage of a pipeline run
pub fn record_stage(stage: &str, duration_secs: f64, success: bool) {
    histogram!(
        format!("{}_stage_duration_seconds", METRICS_PREFIX),
        "stage" => stage.to_string(),
        "status" => if success { "success" } else { "error" }
    )
    .record(duration_secs);
}

/// Record a finished pipeline run
pub fn record_pipeline(duration_secs: f64, outcome: &str) {
    counter!(
        format!("{}_pipeline_runs_total", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    histogram!(format!("{}_pipeline_duration_seconds", METRICS_PREFIX)).record(duration_secs);
}

/// Record the reviewer's verdict
pub fn record_verdict(verdict: &str) {
    counter!(
        format!("{}_review_verdicts_total", METRICS_PREFIX),
        "verdict" => verdict.to_string()
    )
    .increment(1);
}

/// Record how many lore documents a retrieval returned
pub fn record_retrieval(backend: &str, result_count: usize) {
    gauge!(
        format!("{}_retrieval_results_count", METRICS_PREFIX),
        "backend" => backend.to_string()
    )
    .set(result_count as f64);
}

/// Record a generation call, retries included
pub fn record_generation(
    duration_secs: f64,
    model: &str,
    attempts: u32,
    output: Option<&Generation>,
) {
    let status = if output.is_some() { "success" } else { "error" };

    counter!(
        format!("{}_generation_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status
    )
    .increment(1);

    counter!(
        format!("{}_generation_attempts_total", METRICS_PREFIX),
        "model" => model.to_string()
    )
    .increment(attempts as u64);

    histogram!(
        format!("{}_generation_duration_seconds", METRICS_PREFIX),
        "model" => model.to_string()
    )
    .record(duration_secs);

    if let Some(generation) = output {
        counter!(
            format!("{}_generation_tokens_total", METRICS_PREFIX),
            "model" => model.to_string(),
            "direction" => "input"
        )
        .increment(generation.input_tokens as u64);

        counter!(
            format!("{}_generation_tokens_total", METRICS_PREFIX),
            "model" => model.to_string(),
            "direction" => "output"
        )
        .increment(generation.output_tokens as u64);
    }
}

/// Helper to record embedding metrics
pub fn record_embedding(duration_secs: f64, model: &str, batch_size: usize, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status.to_string(),
        "batch" => if batch_size > 1 { "batch" } else { "single" }
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_embedding_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(duration_secs);
    } else {
        counter!(
            format!("{}_embedding_errors_total", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .increment(1);
    }
}

/// Record a session mutation
pub fn record_session_write(operation: &str) {
    counter!(
        format!("{}_session_writes_total", METRICS_PREFIX),
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Helper to record cache metrics
pub fn record_cache(hit: bool, cache_name: &str) {
    if hit {
        counter!(
            format!("{}_cache_hits_total", METRICS_PREFIX),
            "cache" => cache_name.to_string()
        )
        .increment(1);
    } else {
        counter!(
            format!("{}_cache_misses_total", METRICS_PREFIX),
            "cache" => cache_name.to_string()
        )
        .increment(1);
    }
}

/// Record lore documents stored by an ingestion run
pub fn record_ingestion(documents: usize, skipped: usize) {
    counter!(
        format!("{}_lore_documents_ingested_total", METRICS_PREFIX),
        "result" => "stored"
    )
    .increment(documents as u64);

    counter!(
        format!("{}_lore_documents_ingested_total", METRICS_PREFIX),
        "result" => "unchanged"
    )
    .increment(skipped as u64);
}
