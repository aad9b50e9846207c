//! HTTP handlers for the Ingestion service.

use axum::{
    extract::{Multipart, Query, State},
    Json,
};
use rag_common::errors::{AppError, Result};
use rag_common::metrics::RequestMetrics;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;
use tracing::{info, warn};

use crate::state::RunResult;
use crate::{pipeline, AppState};

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    #[serde(default = "default_auto_ingest")]
    pub auto_ingest: bool,
}

fn default_auto_ingest() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub status: String,
    pub filename: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documents_found: Option<usize>,
}

pub async fn upload(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    mut multipart: Multipart,
) -> Result<(axum::http::StatusCode, Json<UploadResponse>)> {
    let metrics = RequestMetrics::start("POST", "/api/v1/upload");

    let mut filename: Option<String> = None;
    let mut bytes: Option<axum::body::Bytes> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::validation(format!("invalid multipart body: {e}")))?
    {
        if field.name() == Some("file") {
            filename = field.file_name().map(str::to_string);
            bytes = Some(
                field
                    .bytes()
                    .await
                    .map_err(|e| AppError::validation(format!("failed to read file: {e}")))?,
            );
        }
    }

    let filename = filename.ok_or_else(|| AppError::validation("No filename provided with the uploaded file."))?;
    let bytes = bytes.ok_or_else(|| AppError::validation("No filename provided with the uploaded file."))?;

    if !filename.to_lowercase().ends_with(".pdf") {
        metrics.finish(400);
        return Err(AppError::validation("Only PDF files are allowed."));
    }

    let max_size_bytes = state.config.max_file_size_mb as usize * 1024 * 1024;
    if bytes.len() > max_size_bytes {
        metrics.finish(413);
        return Err(AppError::too_large(format!(
            "File too large. Maximum size: {}MB",
            state.config.max_file_size_mb
        )));
    }

    let existing_sources = state
        .index
        .existing_sources()
        .await
        .map_err(|e| AppError::internal(e.to_string()))?;
    if existing_sources.contains(&filename) {
        metrics.finish(409);
        return Err(AppError::conflict(format!(
            "File '{filename}' has already been processed. Upload rejected to prevent duplicates."
        )));
    }

    let destination = Path::new(&state.config.source_directory).join(&filename);
    tokio::fs::create_dir_all(&state.config.source_directory)
        .await
        .map_err(AppError::from)?;
    tokio::fs::write(&destination, &bytes)
        .await
        .map_err(AppError::from)?;
    info!(filename = %filename, "uploaded file saved");

    if query.auto_ingest {
        if state.ingestion_state.is_running() {
            metrics.finish(202);
            return Ok((
                axum::http::StatusCode::ACCEPTED,
                Json(UploadResponse {
                    status: "accepted".to_string(),
                    filename: filename.clone(),
                    message: format!("File '{filename}' uploaded successfully. Ingestion is already running."),
                    documents_found: None,
                }),
            ));
        }

        if state.ingestion_state.start_ingestion() {
            tokio::spawn(run_background(state.clone()));
            metrics.finish(202);
            return Ok((
                axum::http::StatusCode::ACCEPTED,
                Json(UploadResponse {
                    status: "accepted".to_string(),
                    filename: filename.clone(),
                    message: format!("File '{filename}' uploaded and ingestion started."),
                    documents_found: None,
                }),
            ));
        }
    }

    metrics.finish(202);
    Ok((
        axum::http::StatusCode::ACCEPTED,
        Json(UploadResponse {
            status: "accepted".to_string(),
            filename: filename.clone(),
            message: format!("File '{filename}' uploaded successfully."),
            documents_found: None,
        }),
    ))
}

#[derive(Debug, Serialize)]
pub struct IngestionResponse {
    pub status: String,
    pub documents_found: usize,
    pub message: String,
}

pub async fn trigger_ingestion(State(state): State<AppState>) -> Result<(axum::http::StatusCode, Json<IngestionResponse>)> {
    let metrics = RequestMetrics::start("POST", "/api/v1/ingest");

    if state.ingestion_state.is_running() {
        metrics.finish(409);
        return Err(AppError::conflict(
            "An ingestion process is already running. Please wait for it to complete.",
        ));
    }

    let pdf_count = count_pdfs(&state.config.source_directory).await;
    let existing_sources = state
        .index
        .existing_sources()
        .await
        .map_err(|e| AppError::internal(e.to_string()))?;
    let has_new_files = list_pdfs(&state.config.source_directory)
        .await
        .into_iter()
        .any(|name| !existing_sources.contains(&name));

    if !has_new_files && pdf_count > 0 {
        metrics.finish(200);
        return Ok((
            axum::http::StatusCode::OK,
            Json(IngestionResponse {
                status: "No new files to process.".to_string(),
                documents_found: pdf_count,
                message: "All documents have already been processed. No ingestion needed.".to_string(),
            }),
        ));
    }

    if !state.ingestion_state.start_ingestion() {
        metrics.finish(409);
        return Err(AppError::conflict(
            "Failed to start ingestion - another process may have started.",
        ));
    }

    tokio::spawn(run_background(state.clone()));

    metrics.finish(202);
    Ok((
        axum::http::StatusCode::ACCEPTED,
        Json(IngestionResponse {
            status: "Ingestion task started.".to_string(),
            documents_found: pdf_count,
            message: "Processing documents in the background. Check logs for progress.".to_string(),
        }),
    ))
}

pub async fn status(State(state): State<AppState>) -> Json<crate::state::StatusSnapshot> {
    RequestMetrics::start("GET", "/api/v1/status").finish(200);
    Json(state.ingestion_state.snapshot())
}

#[derive(Debug, Serialize)]
pub struct DocumentDetail {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct DocumentListResponse {
    pub count: usize,
    pub documents: Vec<DocumentDetail>,
}

pub async fn list_documents(State(state): State<AppState>) -> Json<DocumentListResponse> {
    let metrics = RequestMetrics::start("GET", "/api/v1/documents");
    let names = list_pdfs(&state.config.source_directory).await;
    metrics.finish(200);
    Json(DocumentListResponse {
        count: names.len(),
        documents: names.into_iter().map(|name| DocumentDetail { name }).collect(),
    })
}

pub async fn clear_collection(State(state): State<AppState>) -> Result<axum::response::Response> {
    use axum::response::IntoResponse;

    let metrics = RequestMetrics::start("DELETE", "/api/v1/collection");

    let mut details: Vec<String> = Vec::new();

    let (files_deleted_count, source_files_cleared) = match clear_source_directory(&state.config.source_directory).await {
        Ok(count) => {
            details.push(format!("Successfully deleted {count} file(s) from source directory."));
            (count, true)
        }
        Err(e) => {
            warn!(error = %e, "failed to clear source directory");
            details.push(format!("Failed to delete files from source directory: {e}"));
            (0, false)
        }
    };

    let collection_deleted = match state.index.delete_collection().await {
        Ok(()) => {
            details.push(format!(
                "Successfully deleted collection '{}'.",
                state.config.vector_index.chroma_collection_name
            ));
            true
        }
        Err(e) => {
            warn!(error = %e, "failed to delete collection");
            details.push(format!("Failed to delete collection: {e}"));
            false
        }
    };

    let (status, message) = if collection_deleted && source_files_cleared {
        (axum::http::StatusCode::OK, "ChromaDB collection and source documents cleared successfully.")
    } else if collection_deleted || source_files_cleared {
        (axum::http::StatusCode::MULTI_STATUS, "Partial success in clearing resources. Check details.")
    } else {
        (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to clear ChromaDB collection and/or source documents.",
        )
    };

    metrics.finish(status.as_u16());

    let body = json!({
        "message": message,
        "details": details,
        "files_deleted_count": files_deleted_count,
        "collection_deleted": collection_deleted,
        "source_files_cleared": source_files_cleared,
    });

    Ok((status, Json(body)).into_response())
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok".to_string() })
}

async fn run_background(state: AppState) {
    let outcome = pipeline::run(&state.config, &state.index, &state.embedder).await;
    let had_errors = !outcome.errors.is_empty();
    rag_common::metrics::record_ingestion_run(
        0.0,
        outcome.documents_processed,
        outcome.chunks_added,
        had_errors,
    );
    state.ingestion_state.stop_ingestion(
        RunResult {
            documents_processed: outcome.documents_processed,
            chunks_added: outcome.chunks_added,
        },
        outcome.errors,
    );
}

async fn list_pdfs(source_directory: &str) -> Vec<String> {
    let root = Path::new(source_directory);
    if !root.exists() || !root.is_dir() {
        return Vec::new();
    }
    let mut names = Vec::new();
    collect_pdfs(root, &mut names).await;
    names
}

fn collect_pdfs<'a>(
    dir: &'a Path,
    out: &'a mut Vec<String>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
    Box::pin(async move {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(e) => e,
            Err(_) => return,
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.is_dir() {
                collect_pdfs(&path, out).await;
            } else if path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("pdf"))
                .unwrap_or(false)
            {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    out.push(name.to_string());
                }
            }
        }
    })
}

async fn count_pdfs(source_directory: &str) -> usize {
    list_pdfs(source_directory).await.len()
}

async fn clear_source_directory(source_directory: &str) -> std::io::Result<usize> {
    let root = Path::new(source_directory);
    if !root.exists() || !root.is_dir() {
        return Ok(0);
    }
    let mut deleted = 0;
    let mut entries = tokio::fs::read_dir(root).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.is_file() {
            tokio::fs::remove_file(&path).await?;
            deleted += 1;
        }
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rag_common::config::{IngestionConfig, VectorIndexConfig};
    use rag_common::embeddings::DeterministicEmbedder;
    use rag_common::vector_index::LocalVectorIndex;
    use crate::state::IngestionStateService;
    use std::sync::Arc as StdArc;

    fn tempdir(label: &str) -> String {
        let mut path = std::env::temp_dir();
        path.push(format!("rag-ingestion-test-{label}-{}", std::process::id()));
        path.to_string_lossy().to_string()
    }

    fn test_state(label: &str) -> AppState {
        let source_directory = tempdir(&format!("{label}-src"));
        std::fs::create_dir_all(&source_directory).unwrap();
        let config = IngestionConfig {
            host: "0.0.0.0".to_string(),
            port: 8001,
            source_directory,
            max_file_size_mb: 50,
            chunk_size: 1000,
            chunk_overlap: 150,
            clean_collection_before_ingest: false,
            vector_index: VectorIndexConfig {
                chroma_mode: rag_common::config::ChromaMode::Local,
                chroma_host: "localhost".to_string(),
                chroma_port: 8001,
                chroma_path: Some(tempdir(&format!("{label}-chroma"))),
                chroma_collection_name: "test_collection".to_string(),
                embedding_model_name: "test-model".to_string(),
            },
        };
        let index: StdArc<dyn rag_common::vector_index::VectorIndex> =
            StdArc::new(LocalVectorIndex::new(tempdir(&format!("{label}-chroma")), "test_collection".to_string()));
        let embedder: StdArc<dyn rag_common::embeddings::Embedder> =
            StdArc::new(DeterministicEmbedder::new("test-model", 16));
        AppState {
            config: StdArc::new(config),
            index,
            embedder,
            ingestion_state: StdArc::new(IngestionStateService::default()),
        }
    }

    #[tokio::test]
    async fn clear_collection_reports_details_and_counts() {
        let state = test_state("clear");
        std::fs::write(Path::new(&state.config.source_directory).join("a.pdf"), b"x").unwrap();

        let response = clear_collection(State(state)).await.unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["files_deleted_count"], 1);
        assert_eq!(json["collection_deleted"], true);
        assert_eq!(json["source_files_cleared"], true);
        assert!(json["details"].as_array().unwrap().len() >= 2);
    }

    #[tokio::test]
    async fn list_documents_counts_pdfs_in_source_directory() {
        let state = test_state("list");
        std::fs::write(Path::new(&state.config.source_directory).join("a.pdf"), b"x").unwrap();
        std::fs::write(Path::new(&state.config.source_directory).join("b.pdf"), b"x").unwrap();

        let Json(response) = list_documents(State(state)).await;
        assert_eq!(response.count, 2);
    }
}
