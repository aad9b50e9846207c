//! HTTP handlers for the Retrieval service.

use axum::{extract::State, Json};
use rag_common::errors::{AppError, Result};
use rag_common::metrics::RequestMetrics;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RetrieveRequest {
    pub query: String,
    #[serde(default)]
    pub top_k: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct RetrieveResponse {
    pub chunks: Vec<String>,
    pub collection_name: String,
    pub query: String,
}

const MAX_QUERY_LEN: usize = 10_000;

pub async fn retrieve(
    State(state): State<AppState>,
    Json(request): Json<RetrieveRequest>,
) -> Result<Json<RetrieveResponse>> {
    let metrics = RequestMetrics::start("POST", "/api/v1/retrieve");
    let start = std::time::Instant::now();

    let result = do_retrieve(&state, request).await;

    let status = match &result {
        Ok(_) => 200,
        Err(e) => e.status_code().as_u16(),
    };
    metrics.finish(status);
    if result.is_ok() {
        rag_common::metrics::record_retrieval(start.elapsed().as_secs_f64());
    }
    result.map(Json)
}

async fn do_retrieve(state: &AppState, request: RetrieveRequest) -> Result<RetrieveResponse> {
    let trimmed = request.query.trim();

    if trimmed.chars().count() > MAX_QUERY_LEN {
        return Err(AppError::validation(format!(
            "query exceeds maximum length of {MAX_QUERY_LEN} characters"
        )));
    }

    if trimmed.is_empty() {
        return Ok(RetrieveResponse {
            chunks: Vec::new(),
            collection_name: state.index.collection_name().to_string(),
            query: request.query,
        });
    }

    let top_k = request.top_k.unwrap_or(state.config.top_k_results);

    let embedding = state
        .embedder
        .embed(trimmed)
        .await
        .map_err(|e| AppError::internal(e.to_string()))?;

    let hits = match state.index.query(&embedding, top_k).await {
        Ok(hits) => hits,
        Err(e) if is_collection_not_found(&e) => {
            warn!("collection handle stale, retrying after get_or_create_collection");
            state.index.get_or_create_collection().await.map_err(|e| {
                AppError::upstream(axum::http::StatusCode::SERVICE_UNAVAILABLE, e.to_string())
            })?;
            state.index.query(&embedding, top_k).await.map_err(|e| {
                AppError::upstream(axum::http::StatusCode::SERVICE_UNAVAILABLE, e.to_string())
            })?
        }
        Err(e) => return Err(AppError::internal(e.to_string())),
    };

    let chunks: Vec<String> = hits
        .into_iter()
        .filter(|hit| hit.distance <= state.config.distance_threshold)
        .map(|hit| hit.text)
        .collect();

    Ok(RetrieveResponse {
        chunks,
        collection_name: state.index.collection_name().to_string(),
        query: request.query,
    })
}

fn is_collection_not_found(err: &AppError) -> bool {
    let message = err.to_string().to_lowercase();
    message.contains("not found") || message.contains("does not exist")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rag_common::config::RetrievalConfig;
    use rag_common::embeddings::DeterministicEmbedder;
    use rag_common::vector_index::{LocalVectorIndex, VectorRow};
    use serde_json::json;
    use std::sync::Arc;

    fn tempdir(label: &str) -> String {
        let mut path = std::env::temp_dir();
        path.push(format!("rag-retrieval-test-{label}-{}", std::process::id()));
        path.to_string_lossy().to_string()
    }

    fn test_state(label: &str, top_k: usize, distance_threshold: f32) -> AppState {
        let config = RetrievalConfig {
            host: "0.0.0.0".to_string(),
            port: 8000,
            top_k_results: top_k,
            distance_threshold,
            vector_index: rag_common::config::VectorIndexConfig {
                chroma_mode: rag_common::config::ChromaMode::Local,
                chroma_host: "localhost".to_string(),
                chroma_port: 8001,
                chroma_path: Some(tempdir(label)),
                chroma_collection_name: "test_collection".to_string(),
                embedding_model_name: "test-model".to_string(),
            },
        };
        let index: Arc<dyn rag_common::vector_index::VectorIndex> =
            Arc::new(LocalVectorIndex::new(tempdir(label), "test_collection".to_string()));
        let embedder: Arc<dyn rag_common::embeddings::Embedder> =
            Arc::new(DeterministicEmbedder::new("test-model", 16));
        AppState { config: Arc::new(config), index, embedder }
    }

    #[tokio::test]
    async fn empty_query_returns_empty_chunks_without_embedding() {
        let state = test_state("empty-query", 5, 1.0);
        let response = do_retrieve(&state, RetrieveRequest { query: "   ".to_string(), top_k: None })
            .await
            .unwrap();
        assert!(response.chunks.is_empty());
    }

    #[tokio::test]
    async fn oversize_query_is_rejected() {
        let state = test_state("oversize-query", 5, 1.0);
        let query = "a".repeat(MAX_QUERY_LEN + 1);
        let err = do_retrieve(&state, RetrieveRequest { query, top_k: None }).await.unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn distance_threshold_filters_out_far_hits() {
        let state = test_state("distance-filter", 5, 0.0);
        let embedding = state.embedder.embed("hello world").await.unwrap();
        state
            .index
            .add(&[VectorRow {
                id: "row-1".to_string(),
                text: "hello world chunk".to_string(),
                embedding,
                metadata: json!({ "source": "doc.pdf" }),
            }])
            .await
            .unwrap();

        let response = do_retrieve(&state, RetrieveRequest { query: "completely different text".to_string(), top_k: None })
            .await
            .unwrap();
        assert!(response.chunks.is_empty(), "far hit should be filtered by distance_threshold = 0.0");
    }

    #[tokio::test]
    async fn matching_query_returns_chunk_within_threshold() {
        let state = test_state("distance-match", 5, 2.0);
        let embedding = state.embedder.embed("hello world").await.unwrap();
        state
            .index
            .add(&[VectorRow {
                id: "row-1".to_string(),
                text: "hello world chunk".to_string(),
                embedding,
                metadata: json!({ "source": "doc.pdf" }),
            }])
            .await
            .unwrap();

        let response = do_retrieve(&state, RetrieveRequest { query: "hello world".to_string(), top_k: None })
            .await
            .unwrap();
        assert_eq!(response.chunks, vec!["hello world chunk".to_string()]);
    }

    /// A `VectorIndex` double whose first `query` call reports the
    /// collection missing, exercising `do_retrieve`'s single-retry branch.
    struct FlakyIndex {
        query_calls: std::sync::atomic::AtomicUsize,
        recreated: std::sync::atomic::AtomicBool,
        fail_after_retry: bool,
    }

    #[async_trait::async_trait]
    impl rag_common::vector_index::VectorIndex for FlakyIndex {
        async fn get_or_create_collection(&self) -> rag_common::errors::Result<()> {
            self.recreated.store(true, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }

        async fn query(&self, _embedding: &[f32], _n_results: usize) -> rag_common::errors::Result<Vec<rag_common::vector_index::QueryHit>> {
            let call = self.query_calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if call == 0 {
                return Err(AppError::upstream(axum::http::StatusCode::SERVICE_UNAVAILABLE, "collection not found"));
            }
            if self.fail_after_retry {
                return Err(AppError::upstream(axum::http::StatusCode::SERVICE_UNAVAILABLE, "still unavailable"));
            }
            Ok(vec![rag_common::vector_index::QueryHit { text: "recovered chunk".to_string(), distance: 0.0 }])
        }

        async fn add(&self, _rows: &[VectorRow]) -> rag_common::errors::Result<()> {
            Ok(())
        }

        async fn delete_collection(&self) -> rag_common::errors::Result<()> {
            Ok(())
        }

        async fn existing_sources(&self) -> rag_common::errors::Result<std::collections::HashSet<String>> {
            Ok(std::collections::HashSet::new())
        }

        fn collection_name(&self) -> &str {
            "flaky_collection"
        }
    }

    fn flaky_state(fail_after_retry: bool) -> AppState {
        let config = RetrievalConfig {
            host: "0.0.0.0".to_string(),
            port: 8000,
            top_k_results: 5,
            distance_threshold: 1.0,
            vector_index: rag_common::config::VectorIndexConfig {
                chroma_mode: rag_common::config::ChromaMode::Local,
                chroma_host: "localhost".to_string(),
                chroma_port: 8001,
                chroma_path: Some(tempdir("flaky")),
                chroma_collection_name: "flaky_collection".to_string(),
                embedding_model_name: "test-model".to_string(),
            },
        };
        let index: Arc<dyn rag_common::vector_index::VectorIndex> = Arc::new(FlakyIndex {
            query_calls: std::sync::atomic::AtomicUsize::new(0),
            recreated: std::sync::atomic::AtomicBool::new(false),
            fail_after_retry,
        });
        let embedder: Arc<dyn rag_common::embeddings::Embedder> = Arc::new(DeterministicEmbedder::new("test-model", 16));
        AppState { config: Arc::new(config), index, embedder }
    }

    #[tokio::test]
    async fn collection_not_found_retries_once_then_succeeds() {
        let state = flaky_state(false);
        let response = do_retrieve(&state, RetrieveRequest { query: "hello".to_string(), top_k: None })
            .await
            .unwrap();
        assert_eq!(response.chunks, vec!["recovered chunk".to_string()]);
    }

    #[tokio::test]
    async fn collection_not_found_surfaces_503_if_retry_also_fails() {
        let state = flaky_state(true);
        let err = do_retrieve(&state, RetrieveRequest { query: "hello".to_string(), top_k: None })
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::SERVICE_UNAVAILABLE);
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok".to_string() })
}
