//! Retrieval service.
//!
//! Given a text query, encodes it and returns up to `TOP_K_RESULTS` chunk
//! texts from the vector collection whose distance is within
//! `DISTANCE_THRESHOLD`.

mod handlers;

use axum::{routing::get, routing::post, Router};
use rag_common::config::RetrievalConfig;
use rag_common::embeddings::{DeterministicEmbedder, Embedder};
use rag_common::vector_index::{build_vector_index, VectorIndex};
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
    pub config: Arc<RetrievalConfig>,
    pub index: Arc<dyn VectorIndex>,
    pub embedder: Arc<dyn Embedder>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(true)
        .json()
        .init();

    info!("Starting Retrieval service v{}", rag_common::VERSION);

    let config = RetrievalConfig::load().map_err(|e| {
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
    };

    let app = create_router(state, prometheus_handle);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Retrieval service shutdown complete");
    Ok(())
}

fn create_router(state: AppState, prometheus_handle: metrics_exporter_prometheus::PrometheusHandle) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let api_routes = Router::new().route("/retrieve", post(handlers::retrieve));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(handlers::health))
        .route("/metrics", get(move || async move { prometheus_handle.render() }))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
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
