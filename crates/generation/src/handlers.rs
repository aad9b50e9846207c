//! HTTP handlers for the Generation service.

use axum::{extract::State, Json};
use rag_common::errors::{AppError, Result};
use rag_common::metrics::RequestMetrics;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub query: String,
    #[serde(default)]
    pub context_chunks: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub answer: String,
}

pub async fn generate(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>> {
    let metrics = RequestMetrics::start("POST", "/api/v1/generate");

    let result = do_generate(&state, request).await;

    let status = match &result {
        Ok(_) => 200,
        Err(e) => e.status_code().as_u16(),
    };
    metrics.finish(status);
    result.map(Json)
}

async fn do_generate(state: &AppState, request: GenerateRequest) -> Result<GenerateResponse> {
    if request.query.trim().is_empty() {
        return Err(AppError::validation("Query cannot be empty"));
    }

    info!(
        chunks = request.context_chunks.len(),
        "generation request received"
    );

    let answer = state.llm.generate_answer(&request.query, &request.context_chunks).await?;

    Ok(GenerateResponse { answer })
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok".to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmClient;
    use rag_common::config::GenerationConfig;
    use std::sync::Arc;

    fn test_state() -> AppState {
        let config = GenerationConfig {
            host: "0.0.0.0".to_string(),
            port: 8000,
            llm_provider: "openai".to_string(),
            llm_model_name: "gpt-4o-mini".to_string(),
            llm_temperature: 0.0,
            llm_max_tokens: 256,
            llm_api_key: Some("test-key".to_string()),
            llm_api_base: None,
        };
        AppState { llm: Arc::new(LlmClient::new(config).unwrap()) }
    }

    #[tokio::test]
    async fn empty_query_is_rejected_before_calling_llm() {
        let state = test_state();
        let err = do_generate(&state, GenerateRequest { query: "   ".to_string(), context_chunks: vec![] })
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    }
}
