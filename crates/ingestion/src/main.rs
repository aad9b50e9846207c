//! Ingestion service.
//!
//! Accepts PDF uploads, extracts and chunks their text, embeds the chunks,
//! and writes them to the vector collection. Exactly one ingestion run may
//! be in flight at a time, enforced by `IngestionStateService` (see
//! `state.rs`).

mod handlers;
mod pipeline;
mod state;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use rag_common::config::IngestionConfig;
use rag_common::embeddings::{DeterministicEmbedder, Embedder};
use rag_common::vector_index::{build_vector_index, VectorIndex};
use state::IngestionStateService;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info, Level};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<IngestionConfig>,
    pub index: Arc<dyn VectorIndex>,
    pub embedder: Arc<dyn Embedder>,
    pub ingestion_state: Arc<IngestionStateService>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(true)
        .json()
        .init();

    info!("Starting Ingestion service v{}", rag_common::VERSION);

    let config = IngestionConfig::load().map_err(|e| {
        tracing::error!(error = %e, "Failed to load configuration");
        e
    })?;
    let config = Arc::new(config);

    rag_common::metrics::register_metrics();
    let prometheus_handle = rag_common::metrics::install_recorder();

    let index = build_vector_index(&config.vector_index)?;
    index.get_or_create_collection().await?;

    let embedder: Arc<dyn Embedder> = Arc::new(DeterministicEmbedder::new(
        config.vector_index.embedding_model_name.clone(),
        rag_common::DEFAULT_EMBEDDING_DIMENSION,
    ));

    let state = AppState {
        config: config.clone(),
        index,
        embedder,
        ingestion_state: Arc::new(IngestionStateService::default()),
    };

    let app = create_router(state, prometheus_handle);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Ingestion service shutdown complete");
    Ok(())
}

fn create_router(state: AppState, prometheus_handle: metrics_exporter_prometheus::PrometheusHandle) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // Axum's default body limit (~2MB) would reject uploads before
    // `handlers::upload`'s own max_file_size_mb check ever runs. Size this
    // generously above the configured max so that check is the one that
    // actually rejects oversize files, with the spec's 413 response.
    let body_limit_bytes = (state.config.max_file_size_mb as usize * 1024 * 1024) + 1024 * 1024;

    let api_routes = Router::new()
        .route("/upload", post(handlers::upload))
        .route("/ingest", post(handlers::trigger_ingestion))
        .route("/status", get(handlers::status))
        .route("/documents", get(handlers::list_documents))
        .route("/collection", delete(handlers::clear_collection));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(handlers::health))
        .route("/metrics", get(move || async move { prometheus_handle.render() }))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .layer(DefaultBodyLimit::max(body_limit_bytes))
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
