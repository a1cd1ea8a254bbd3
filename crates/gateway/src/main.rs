//! Loreweaver HTTP Gateway
//!
//! Serves narrative turns and session maintenance over HTTP.
//! Handles:
//! - Request routing and validation
//! - Rate limiting
//! - Observability (structured logs, Prometheus metrics, request ids)

mod handlers;
mod middleware;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};
use loreweaver_common::{
    config::AppConfig,
    documents::create_document_store,
    embeddings::create_embedder,
    llm::create_generator,
    metrics,
    pipeline::NarrativeService,
    sessions::SessionStore,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::Notify;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const MAX_BODY_BYTES: usize = 64 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub service: Arc<NarrativeService>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load()?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));
    if config.observability.json_logging {
        tracing_subscriber::fmt().with_env_filter(filter).with_target(true).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
    }

    info!("Starting Loreweaver Gateway v{}", loreweaver_common::VERSION);

    config.validate().map_err(|e| {
        error!(error = %e, "Invalid configuration");
        e
    })?;
    let config = Arc::new(config);

    // Initialize metrics
    let metrics_addr = SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port));
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Suffix("request_duration_seconds".to_string()),
            metrics::LATENCY_BUCKETS,
        )?
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Suffix("stage_duration_seconds".to_string()),
            metrics::STAGE_BUCKETS,
        )?
        .install()?;
    metrics::register_metrics();
    info!(%metrics_addr, "Prometheus exporter listening");

    // Wire the pipeline
    let embedder = create_embedder(&config.embedding)?;
    let documents = create_document_store(&config, embedder).await?;
    let generator = create_generator(&config.generation)?;
    let sessions = Arc::new(SessionStore::from_config(&config.storage, &config.sessions).await?);

    info!(
        backend = documents.backend_name(),
        model = generator.model_name(),
        sessions_dir = %config.storage.sessions_dir.display(),
        "Narrative pipeline ready"
    );

    let service = NarrativeService::from_config(&config, documents, generator, sessions);

    // Create app state
    let state = AppState {
        config: config.clone(),
        service: Arc::new(service),
    };

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    let draining = Arc::new(Notify::new());
    let signalled = draining.clone();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            signalled.notify_one();
        })
        .into_future();

    let grace = config.shutdown_timeout();
    tokio::select! {
        result = server => result?,
        _ = drain_deadline(&draining, grace) => {
            warn!(grace_secs = grace.as_secs(), "Shutdown grace period elapsed, dropping open connections");
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    let config = state.config.clone();

    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let mut router = Router::new()
        // Health endpoints
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))

        // Narrative endpoint
        .route("/narrative", post(handlers::narrative::generate_narrative))

        // Session endpoints
        .route("/sessions", get(handlers::sessions::list_sessions))
        .route("/session/{id}", get(handlers::sessions::get_session))
        .route("/session/{id}/history", get(handlers::sessions::get_history))
        .route("/session/{id}/undo", post(handlers::sessions::undo))
        .route("/session/{id}/messages/{index}", put(handlers::sessions::edit_message))
        .route("/session/{id}/export", get(handlers::sessions::export));

    if config.rate_limit.enabled {
        let limit = config.rate_limit.requests_per_second;
        let limiter = middleware::rate_limit::create_rate_limiter(limit, config.rate_limit.burst);
        router = router.layer(axum::middleware::from_fn(move |request, next| {
            middleware::rate_limit::rate_limit_middleware(limiter.clone(), limit, request, next)
        }));
    }

    // Compose the app
    router
        .layer(axum::middleware::from_fn(middleware::metrics::track_metrics))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(ConcurrencyLimitLayer::new(config.server.max_concurrent_requests))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Resolves `grace` after shutdown starts
async fn drain_deadline(draining: &Notify, grace: Duration) {
    draining.notified().await;
    tokio::time::sleep(grace).await;
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use loreweaver_common::config::SessionCacheConfig;
    use loreweaver_common::documents::{InMemoryDocumentStore, LoreDocument};
    use loreweaver_common::embeddings::HashingEmbedder;
    use loreweaver_common::llm::EchoGenerator;
    use loreweaver_common::pipeline::PipelineSettings;
    use tempfile::TempDir;
    use tower::ServiceExt;

    async fn test_app() -> (TempDir, Router) {
        let dir = TempDir::new().unwrap();
        let mut config = AppConfig::default();
        config.rate_limit.enabled = false;

        let store = InMemoryDocumentStore::new(Arc::new(HashingEmbedder::new(256)));
        store
            .insert(vec![
                LoreDocument {
                    id: "ruins".into(),
                    source_label: "ruins.md".into(),
                    body: "Ancient ruins stand half-buried in the desert sand.".into(),
                },
                LoreDocument {
                    id: "markings".into(),
                    source_label: "markings.md".into(),
                    body: "Markings on the walls tell of the glass kings.".into(),
                },
            ])
            .await
            .unwrap();

        let sessions = SessionStore::open(dir.path(), &SessionCacheConfig::default())
            .await
            .unwrap();
        let service = NarrativeService::new(
            Arc::new(store),
            Arc::new(EchoGenerator),
            Arc::new(sessions),
            PipelineSettings::default(),
        );

        let state = AppState {
            config: Arc::new(config),
            service: Arc::new(service),
        };
        (dir, create_router(state))
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_documents() {
        let (_dir, app) = test_app().await;
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["documents"], 2);
        assert_eq!(body["model"], "echo");
    }

    #[tokio::test]
    async fn test_narrative_then_session_routes() {
        let (_dir, app) = test_app().await;

        let response = app
            .clone()
            .oneshot(post_json(
                "/narrative",
                serde_json::json!({ "user_input": "I discover ancient ruins in the desert" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        let session_id = body["session_id"].as_str().unwrap().to_string();
        assert!(body["documents_used"].as_array().unwrap().len() <= 3);

        let response = app
            .clone()
            .oneshot(
                Request::get(format!("/session/{}", session_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(json_body(response).await["message_count"], 2);

        let response = app
            .clone()
            .oneshot(
                Request::get(format!("/session/{}/export", session_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/markdown"));

        let response = app
            .clone()
            .oneshot(post_json(&format!("/session/{}/undo", session_id), serde_json::json!({})))
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["message_count"], 0);
    }

    #[tokio::test]
    async fn test_drain_deadline_waits_for_shutdown() {
        let draining = Notify::new();
        let deadline = drain_deadline(&draining, Duration::from_millis(10));
        tokio::pin!(deadline);

        let early = tokio::time::timeout(Duration::from_millis(50), &mut deadline).await;
        assert!(early.is_err());

        draining.notify_one();
        tokio::time::timeout(Duration::from_millis(500), &mut deadline)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unknown_session_is_404() {
        let (_dir, app) = test_app().await;
        let response = app
            .oneshot(Request::get("/session/nobody").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_empty_input_rejected() {
        let (_dir, app) = test_app().await;
        let response = app
            .oneshot(post_json("/narrative", serde_json::json!({ "user_input": "" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_edit_out_of_range() {
        let (_dir, app) = test_app().await;
        app.clone()
            .oneshot(post_json(
                "/narrative",
                serde_json::json!({ "user_input": "I wait", "session_id": "camp" }),
            ))
            .await
            .unwrap();

        let response = app
            .oneshot(
                Request::put("/session/camp/messages/5")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"content":"changed"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
