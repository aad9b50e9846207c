//! Orchestrator (RAG) service.
//!
//! The only public surface. Converts client requests into a sequence of
//! calls across Retrieval, Generation, and Ingestion, with typed error
//! remapping and bounded timeouts (spec §4.4).

mod clients;
mod handlers;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use clients::ServiceClients;
use rag_common::config::OrchestratorConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info, Level};

/// Orchestrator has no `max_file_size_mb` of its own — Ingestion enforces
/// the configured limit on the proxied upload. This only needs to be large
/// enough that axum's extractor layer doesn't reject the body before it can
/// reach that proxy call.
const UPLOAD_BODY_LIMIT_BYTES: usize = 100 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub clients: Arc<ServiceClients>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(true)
        .json()
        .init();

    info!("Starting Orchestrator service v{}", rag_common::VERSION);

    let config = OrchestratorConfig::load().map_err(|e| {
        tracing::error!(error = %e, "Failed to load configuration");
        e
    })?;
    let port = config.port;

    rag_common::metrics::register_metrics();
    let prometheus_handle = rag_common::metrics::install_recorder();

    let clients = Arc::new(ServiceClients::new(config)?);
    let state = AppState { clients };

    let app = create_router(state, prometheus_handle);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Orchestrator service shutdown complete");
    Ok(())
}

fn create_router(state: AppState, prometheus_handle: metrics_exporter_prometheus::PrometheusHandle) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let api_routes = Router::new()
        .route("/chat", post(handlers::chat))
        .route("/documents/upload", post(handlers::upload_document))
        .route("/documents", get(handlers::list_documents))
        .route("/documents", delete(handlers::delete_documents))
        .route("/ingestion/status", get(handlers::ingestion_status));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(handlers::health))
        .route("/metrics", get(move || async move { prometheus_handle.render() }))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT_BYTES))
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
