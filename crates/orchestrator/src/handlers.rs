//! HTTP handlers for the Orchestrator (RAG) service — the public surface.

use axum::{
    extract::{Multipart, State},
    response::IntoResponse,
    Json,
};
use rag_common::errors::{AppError, Result};
use rag_common::metrics::RequestMetrics;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub query: String,
    pub response: String,
}

pub async fn chat(State(state): State<AppState>, Json(request): Json<ChatRequest>) -> Result<Json<ChatResponse>> {
    let metrics = RequestMetrics::start("POST", "/api/v1/chat");
    let result = do_chat(&state, request).await;
    metrics.finish(match &result {
        Ok(_) => 200,
        Err(e) => e.status_code().as_u16(),
    });
    result.map(Json)
}

async fn do_chat(state: &AppState, request: ChatRequest) -> Result<ChatResponse> {
    if request.message.trim().is_empty() {
        return Err(AppError::unprocessable("message must not be empty"));
    }

    info!(query = %request.message, "chat request received");

    let chunks = state.clients.retrieve(&request.message).await?;
    if chunks.is_empty() {
        info!("no context chunks retrieved, proceeding without context");
    }

    let answer = state.clients.generate(&request.message, &chunks).await.map_err(|e| {
        if e.status_code() == axum::http::StatusCode::SERVICE_UNAVAILABLE {
            e
        } else {
            AppError::internal("An unexpected error occurred while generating a response.")
        }
    })?;

    Ok(ChatResponse { query: request.message, response: answer })
}

pub async fn upload_document(State(state): State<AppState>, mut multipart: Multipart) -> Result<axum::response::Response> {
    let metrics = RequestMetrics::start("POST", "/api/v1/documents/upload");

    let mut filename: Option<String> = None;
    let mut content_type: Option<String> = None;
    let mut bytes: Option<axum::body::Bytes> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::validation(format!("invalid multipart body: {e}")))?
    {
        if field.name() == Some("file") {
            filename = field.file_name().map(str::to_string);
            content_type = field.content_type().map(str::to_string);
            bytes = Some(
                field
                    .bytes()
                    .await
                    .map_err(|e| AppError::validation(format!("failed to read file: {e}")))?,
            );
        }
    }

    let result = do_upload(&state, filename, content_type, bytes).await;
    metrics.finish(match &result {
        Ok((status, _)) => status.as_u16(),
        Err(e) => e.status_code().as_u16(),
    });

    let (status, body) = result?;
    Ok((status, Json(body)).into_response())
}

async fn do_upload(
    state: &AppState,
    filename: Option<String>,
    content_type: Option<String>,
    bytes: Option<axum::body::Bytes>,
) -> Result<(axum::http::StatusCode, serde_json::Value)> {
    let filename = filename.ok_or_else(|| AppError::validation("No filename provided with the uploaded file."))?;
    if !filename.to_lowercase().ends_with(".pdf") {
        return Err(AppError::validation(
            "Invalid file type. Only PDF documents are allowed for upload to RAG service.",
        ));
    }
    let bytes = bytes.ok_or_else(|| AppError::validation("No file content provided."))?;

    state.clients.upload_document(filename, content_type, bytes.to_vec()).await
}

pub async fn list_documents(State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    let metrics = RequestMetrics::start("GET", "/api/v1/documents");
    let result = state.clients.list_documents().await;
    metrics.finish(match &result {
        Ok(_) => 200,
        Err(e) => e.status_code().as_u16(),
    });
    result.map(Json)
}

pub async fn delete_documents(State(state): State<AppState>) -> Result<axum::response::Response> {
    let metrics = RequestMetrics::start("DELETE", "/api/v1/documents");
    let result = state.clients.delete_collection().await;
    metrics.finish(match &result {
        Ok((status, _)) => status.as_u16(),
        Err(e) => e.status_code().as_u16(),
    });
    let (status, body) = result?;
    Ok((status, Json(body)).into_response())
}

pub async fn ingestion_status(State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    let metrics = RequestMetrics::start("GET", "/api/v1/ingestion/status");
    let result = state.clients.ingestion_status().await;
    metrics.finish(match &result {
        Ok(_) => 200,
        Err(e) => e.status_code().as_u16(),
    });
    result.map(Json)
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

    #[tokio::test]
    async fn empty_message_is_rejected_with_422() {
        let config = rag_common::config::OrchestratorConfig {
            host: "0.0.0.0".to_string(),
            port: 8000,
            retrieval_service_url: "http://localhost:8002".to_string(),
            generation_service_url: "http://localhost:8003".to_string(),
            ingestion_service_url: "http://localhost:8001".to_string(),
        };
        let state = AppState { clients: std::sync::Arc::new(crate::clients::ServiceClients::new(config).unwrap()) };
        let err = do_chat(&state, ChatRequest { message: "   ".to_string() }).await.unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::UNPROCESSABLE_ENTITY);
    }
}
