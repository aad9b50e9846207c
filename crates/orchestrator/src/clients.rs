//! Outbound HTTP clients for the other three services.
//!
//! Grounded on `examples/original_source/backend/rag_service/app/services/
//! http_client.py` (`make_request`'s timeout/connect-error classification)
//! and `.../services/chat_processor.py` (retrieval/generation call shape
//! and the `"Error from X: …"` detail remapping).

use rag_common::config::OrchestratorConfig;
use rag_common::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);
const PROXY_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ServiceClients {
    client: reqwest::Client,
    config: OrchestratorConfig,
}

#[derive(Debug, Serialize)]
struct RetrievalRequest<'a> {
    query: &'a str,
    top_k: usize,
}

#[derive(Debug, Deserialize)]
struct RetrievalResponse {
    chunks: Vec<String>,
}

#[derive(Debug, Serialize)]
struct GenerationRequest<'a> {
    query: &'a str,
    context_chunks: &'a [String],
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    answer: String,
}

const CHAT_TOP_K: usize = 5;

impl ServiceClients {
    pub fn new(config: OrchestratorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| AppError::internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    pub async fn retrieve(&self, query: &str) -> Result<Vec<String>> {
        let url = format!("{}/api/v1/retrieve", self.config.retrieval_service_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .timeout(PROXY_TIMEOUT)
            .json(&RetrievalRequest { query, top_k: CHAT_TOP_K })
            .send()
            .await
            .map_err(|e| AppError::upstream(
                axum::http::StatusCode::SERVICE_UNAVAILABLE,
                format!("Error from retrieval: {e}"),
            ))?;

        if !response.status().is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AppError::upstream(
                axum::http::StatusCode::SERVICE_UNAVAILABLE,
                format!("Error from retrieval: {detail}"),
            ));
        }

        let parsed: RetrievalResponse = response.json().await.map_err(|e| {
            AppError::internal(format!("Retrieval service returned data that failed validation: {e}"))
        })?;
        Ok(parsed.chunks)
    }

    pub async fn generate(&self, query: &str, context_chunks: &[String]) -> Result<String> {
        let url = format!("{}/api/v1/generate", self.config.generation_service_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .timeout(PROXY_TIMEOUT)
            .json(&GenerationRequest { query, context_chunks })
            .send()
            .await
            .map_err(|e| AppError::upstream(
                axum::http::StatusCode::SERVICE_UNAVAILABLE,
                format!("Error from generation: {e}"),
            ))?;

        if !response.status().is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AppError::upstream(
                axum::http::StatusCode::SERVICE_UNAVAILABLE,
                format!("Error from generation: {detail}"),
            ));
        }

        let parsed: GenerationResponse = response
            .json()
            .await
            .map_err(|_| AppError::internal("An unexpected error occurred while generating a response."))?;
        Ok(parsed.answer)
    }

    /// `GET /health` against Ingestion, 10s timeout, per spec §4.4's
    /// document-proxy contract.
    async fn check_ingestion_health(&self) -> Result<()> {
        let url = format!("{}/health", self.config.ingestion_service_url.trim_end_matches('/'));
        let response = self.client.get(&url).timeout(HEALTH_CHECK_TIMEOUT).send().await.map_err(|_| {
            AppError::upstream(
                axum::http::StatusCode::SERVICE_UNAVAILABLE,
                format!(
                    "Cannot connect to Ingestion Service. Configured URL: {}",
                    self.config.ingestion_service_url
                ),
            )
        })?;

        if !response.status().is_success() {
            return Err(AppError::upstream(
                axum::http::StatusCode::SERVICE_UNAVAILABLE,
                format!(
                    "Ingestion Service health check failed. Configured URL: {}",
                    self.config.ingestion_service_url
                ),
            ));
        }
        Ok(())
    }

    /// Remaps a downstream ingestion status code per spec §4.4: 409 and 400
    /// pass through, 2xx passes through, everything else becomes 503.
    fn remap_status(status: axum::http::StatusCode) -> axum::http::StatusCode {
        if status.is_success() || status == axum::http::StatusCode::CONFLICT || status == axum::http::StatusCode::BAD_REQUEST {
            status
        } else {
            axum::http::StatusCode::SERVICE_UNAVAILABLE
        }
    }

    pub async fn upload_document(&self, filename: String, content_type: Option<String>, bytes: Vec<u8>) -> Result<(axum::http::StatusCode, serde_json::Value)> {
        self.check_ingestion_health().await?;

        let url = format!("{}/api/v1/upload", self.config.ingestion_service_url.trim_end_matches('/'));
        let part = match &content_type {
            Some(ct) => reqwest::multipart::Part::bytes(bytes.clone())
                .file_name(filename.clone())
                .mime_str(ct)
                .unwrap_or_else(|_| reqwest::multipart::Part::bytes(bytes).file_name(filename.clone())),
            None => reqwest::multipart::Part::bytes(bytes).file_name(filename.clone()),
        };
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(&url)
            .timeout(UPLOAD_TIMEOUT)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                AppError::upstream(axum::http::StatusCode::SERVICE_UNAVAILABLE, format!("Failed to connect to Ingestion Service: {e}"))
            })?;

        let status = Self::remap_status(response.status());
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AppError::upstream(status, detail));
        }

        let body = match response.json::<serde_json::Value>().await {
            Ok(body) => body,
            Err(_) => serde_json::json!({
                "status": "Upload accepted",
                "filename": filename,
                "message": "File upload accepted by ingestion service",
            }),
        };
        Ok((status, body))
    }

    pub async fn list_documents(&self) -> Result<serde_json::Value> {
        self.check_ingestion_health().await?;
        let url = format!("{}/api/v1/documents", self.config.ingestion_service_url.trim_end_matches('/'));
        let response = self.client.get(&url).timeout(PROXY_TIMEOUT).send().await.map_err(|e| {
            AppError::upstream(axum::http::StatusCode::SERVICE_UNAVAILABLE, format!("Failed to connect to Ingestion Service: {e}"))
        })?;

        let status = Self::remap_status(response.status());
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AppError::upstream(status, detail));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::internal(format!("Failed to parse response from Ingestion Service: {e}")))
    }

    pub async fn delete_collection(&self) -> Result<(axum::http::StatusCode, serde_json::Value)> {
        self.check_ingestion_health().await?;
        let url = format!("{}/api/v1/collection", self.config.ingestion_service_url.trim_end_matches('/'));
        let response = self.client.delete(&url).timeout(PROXY_TIMEOUT).send().await.map_err(|e| {
            AppError::upstream(axum::http::StatusCode::SERVICE_UNAVAILABLE, format!("Failed to connect to Ingestion Service: {e}"))
        })?;

        let status = response.status();
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AppError::internal(format!("Failed to parse response from Ingestion Service: {e}")))?;

        // 200/207/500 all pass through verbatim per spec §6 (the ingestion
        // service's own partial-success taxonomy, not remapped to 503).
        Ok((status, body))
    }

    pub async fn ingestion_status(&self) -> Result<serde_json::Value> {
        self.check_ingestion_health().await?;
        let url = format!("{}/api/v1/status", self.config.ingestion_service_url.trim_end_matches('/'));
        let response = self.client.get(&url).timeout(PROXY_TIMEOUT).send().await.map_err(|e| {
            AppError::upstream(axum::http::StatusCode::SERVICE_UNAVAILABLE, format!("Failed to connect to Ingestion Service: {e}"))
        })?;

        let status = Self::remap_status(response.status());
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AppError::upstream(status, detail));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::internal(format!("Failed to parse response from Ingestion Service: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn remap_status_passes_through_2xx_409_400() {
        assert_eq!(ServiceClients::remap_status(StatusCode::OK), StatusCode::OK);
        assert_eq!(ServiceClients::remap_status(StatusCode::ACCEPTED), StatusCode::ACCEPTED);
        assert_eq!(ServiceClients::remap_status(StatusCode::CONFLICT), StatusCode::CONFLICT);
        assert_eq!(ServiceClients::remap_status(StatusCode::BAD_REQUEST), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn remap_status_maps_everything_else_to_503() {
        assert_eq!(ServiceClients::remap_status(StatusCode::NOT_FOUND), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(ServiceClients::remap_status(StatusCode::INTERNAL_SERVER_ERROR), StatusCode::SERVICE_UNAVAILABLE);
    }

    fn test_config(retrieval: &str, generation: &str, ingestion: &str) -> OrchestratorConfig {
        OrchestratorConfig {
            host: "0.0.0.0".to_string(),
            port: 8000,
            retrieval_service_url: retrieval.to_string(),
            generation_service_url: generation.to_string(),
            ingestion_service_url: ingestion.to_string(),
        }
    }

    #[tokio::test]
    async fn retrieve_returns_chunks_on_success() {
        let retrieval = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/retrieve"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"chunks": ["a", "b"]})))
            .mount(&retrieval)
            .await;

        let clients = ServiceClients::new(test_config(&retrieval.uri(), "http://unused", "http://unused")).unwrap();
        let chunks = clients.retrieve("what is rust?").await.unwrap();
        assert_eq!(chunks, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn retrieve_wraps_downstream_failure_as_503_with_prefix() {
        let retrieval = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/retrieve"))
            .respond_with(ResponseTemplate::new(500).set_body_string("index unavailable"))
            .mount(&retrieval)
            .await;

        let clients = ServiceClients::new(test_config(&retrieval.uri(), "http://unused", "http://unused")).unwrap();
        let err = clients.retrieve("q").await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(format!("{err}").starts_with("Error from retrieval:"));
    }

    #[tokio::test]
    async fn generate_returns_answer_on_success() {
        let generation = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"answer": "42"})))
            .mount(&generation)
            .await;

        let clients = ServiceClients::new(test_config("http://unused", &generation.uri(), "http://unused")).unwrap();
        let answer = clients.generate("q", &[]).await.unwrap();
        assert_eq!(answer, "42");
    }

    #[tokio::test]
    async fn upload_document_synthesizes_body_when_response_is_not_json() {
        let ingestion = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&ingestion)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/upload"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&ingestion)
            .await;

        let clients = ServiceClients::new(test_config("http://unused", "http://unused", &ingestion.uri())).unwrap();
        let (status, body) = clients
            .upload_document("doc.pdf".to_string(), Some("application/pdf".to_string()), b"%PDF-1.4".to_vec())
            .await
            .unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["filename"], "doc.pdf");
        assert_eq!(body["status"], "Upload accepted");
    }

    #[tokio::test]
    async fn upload_document_fails_fast_when_ingestion_is_unhealthy() {
        let ingestion = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&ingestion)
            .await;

        let clients = ServiceClients::new(test_config("http://unused", "http://unused", &ingestion.uri())).unwrap();
        let err = clients
            .upload_document("doc.pdf".to_string(), None, b"%PDF-1.4".to_vec())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn delete_collection_passes_through_ingestion_status_verbatim() {
        let ingestion = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&ingestion)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api/v1/collection"))
            .respond_with(ResponseTemplate::new(207).set_body_json(serde_json::json!({"status": "partial"})))
            .mount(&ingestion)
            .await;

        let clients = ServiceClients::new(test_config("http://unused", "http://unused", &ingestion.uri())).unwrap();
        let (status, body) = clients.delete_collection().await.unwrap();
        assert_eq!(status, StatusCode::MULTI_STATUS);
        assert_eq!(body["status"], "partial");
    }
}
