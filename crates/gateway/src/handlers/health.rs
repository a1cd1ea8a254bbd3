//! Health check handlers

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: &'static str,
    pub model: String,
    pub document_backend: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documents: Option<usize>,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub documents: CheckResult,
    pub sessions: CheckResult,
}

#[derive(Serialize)]
pub struct CheckResult {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckResult {
    fn up(start: std::time::Instant) -> Self {
        Self {
            status: "up".to_string(),
            latency_ms: Some(start.elapsed().as_millis() as u64),
            error: None,
        }
    }

    fn down(error: String) -> Self {
        Self {
            status: "down".to_string(),
            latency_ms: None,
            error: Some(error),
        }
    }

    fn is_up(&self) -> bool {
        self.status == "up"
    }
}

/// Liveness probe with document count and model name
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let documents = state.service.documents();
    let count = documents.count().await.ok();

    Json(HealthResponse {
        status: if count.is_some() { "healthy" } else { "degraded" }.to_string(),
        version: loreweaver_common::VERSION,
        model: state.service.model_name().to_string(),
        document_backend: documents.backend_name(),
        documents: count,
    })
}

/// Readiness probe: lore reachable and non-empty, sessions directory writable
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let start = std::time::Instant::now();
    let documents_check = match state.service.documents().count().await {
        Ok(0) => CheckResult::down("no lore documents indexed".to_string()),
        Ok(_) => CheckResult::up(start),
        Err(e) => CheckResult::down(e.to_string()),
    };

    let start = std::time::Instant::now();
    let probe = state.service.sessions().dir().join(".ready-probe");
    let sessions_check = match tokio::fs::write(&probe, b"ok").await {
        Ok(()) => {
            let _ = tokio::fs::remove_file(&probe).await;
            CheckResult::up(start)
        }
        Err(e) => CheckResult::down(e.to_string()),
    };

    let all_healthy = documents_check.is_up() && sessions_check.is_up();
    let status = if all_healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    (
        status,
        Json(ReadyResponse {
            status: if all_healthy { "ready" } else { "not_ready" }.to_string(),
            checks: HealthChecks {
                documents: documents_check,
                sessions: sessions_check,
            },
        }),
    )
}
