//! Vector index client.
//!
//! Spec §1 scopes the vector index engine as an external collaborator:
//! "key-value + ANN index exposing collection CRUD and embedding-aware
//! `query`/`add`". `examples/original_source` backs this with ChromaDB,
//! reached either as an embedded `PersistentClient` (`CHROMA_MODE=local`)
//! or over HTTP (`CHROMA_MODE=docker`). `VectorIndex` models that
//! collaborator; `HttpVectorIndex` and `LocalVectorIndex` are the two modes.

use crate::config::{ChromaMode, VectorIndexConfig};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// One row to be written to the collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRow {
    pub id: String,
    pub text: String,
    pub embedding: Vec<f32>,
    /// Always carries `source` (the originating filename) per spec §3.
    pub metadata: serde_json::Value,
}

impl VectorRow {
    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").and_then(|v| v.as_str())
    }
}

/// One hit returned by a query, before distance filtering.
#[derive(Debug, Clone)]
pub struct QueryHit {
    pub text: String,
    pub distance: f32,
}

/// The external vector-index collaborator (spec §1, §4.1, §4.2).
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Idempotent: create the collection if absent, otherwise no-op.
    async fn get_or_create_collection(&self) -> Result<()>;

    /// Nearest-neighbor query against the collection, ordered by ascending
    /// distance (the ANN index's own contract — see spec §4.2).
    async fn query(&self, embedding: &[f32], n_results: usize) -> Result<Vec<QueryHit>>;

    /// Batched upsert-by-id. Re-adding an existing id overwrites it.
    async fn add(&self, rows: &[VectorRow]) -> Result<()>;

    /// Delete the collection. Idempotent: "collection not found" is treated
    /// as success per spec §9's Open Question resolution.
    async fn delete_collection(&self) -> Result<()>;

    /// The set of source filenames already represented in the collection,
    /// derived from `metadata.source` of existing rows (spec §4.1's
    /// exactly-once-per-document policy).
    async fn existing_sources(&self) -> Result<HashSet<String>>;

    fn collection_name(&self) -> &str;
}

/// Build a `VectorIndex` from configuration, matching the `CHROMA_MODE`
/// branch in `get_chroma_client()` (original_source).
pub fn build_vector_index(config: &VectorIndexConfig) -> Result<Arc<dyn VectorIndex>> {
    match config.chroma_mode {
        ChromaMode::Docker => Ok(Arc::new(HttpVectorIndex::new(
            config.chroma_host.clone(),
            config.chroma_port,
            config.chroma_collection_name.clone(),
        )?)),
        ChromaMode::Local => {
            let path = config.chroma_path.clone().ok_or_else(|| {
                AppError::Configuration { message: "CHROMA_PATH is required for local mode".into() }
            })?;
            Ok(Arc::new(LocalVectorIndex::new(path, config.chroma_collection_name.clone())))
        }
    }
}

/// HTTP-backed vector index, talking to a Chroma-compatible API.
pub struct HttpVectorIndex {
    client: reqwest::Client,
    base_url: String,
    collection_name: String,
}

#[derive(Serialize)]
struct ChromaQueryRequest<'a> {
    query_embeddings: Vec<&'a [f32]>,
    n_results: usize,
    include: Vec<&'static str>,
}

#[derive(Deserialize)]
struct ChromaQueryResponse {
    documents: Vec<Vec<String>>,
    distances: Vec<Vec<f32>>,
}

#[derive(Serialize)]
struct ChromaAddRequest<'a> {
    ids: Vec<&'a str>,
    documents: Vec<&'a str>,
    embeddings: Vec<&'a [f32]>,
    metadatas: Vec<&'a serde_json::Value>,
}

#[derive(Deserialize)]
struct ChromaGetResponse {
    metadatas: Vec<Option<serde_json::Value>>,
}

impl HttpVectorIndex {
    pub fn new(host: String, port: u16, collection_name: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(AppError::from)?;
        Ok(Self { client, base_url: format!("http://{host}:{port}"), collection_name })
    }

    fn collection_url(&self) -> String {
        format!("{}/api/v1/collections/{}", self.base_url, self.collection_name)
    }

    async fn not_found_is_success(resp: reqwest::Response) -> Result<()> {
        if resp.status().is_success() {
            return Ok(());
        }
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        let lower = body.to_lowercase();
        if lower.contains("not found") || lower.contains("does not exist") || lower.contains("collection") {
            return Ok(());
        }
        Err(AppError::upstream(
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            format!("vector index error {status}: {body}"),
        ))
    }
}

#[async_trait]
impl VectorIndex for HttpVectorIndex {
    async fn get_or_create_collection(&self) -> Result<()> {
        let resp = self
            .client
            .post(format!("{}/api/v1/collections", self.base_url))
            .json(&json!({ "name": self.collection_name, "get_or_create": true }))
            .send()
            .await
            .map_err(AppError::from)?;
        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::upstream(
                axum::http::StatusCode::SERVICE_UNAVAILABLE,
                format!("failed to create collection: {body}"),
            ));
        }
        Ok(())
    }

    async fn query(&self, embedding: &[f32], n_results: usize) -> Result<Vec<QueryHit>> {
        let resp = self
            .client
            .post(format!("{}/query", self.collection_url()))
            .json(&ChromaQueryRequest {
                query_embeddings: vec![embedding],
                n_results,
                include: vec!["documents", "distances"],
            })
            .send()
            .await
            .map_err(AppError::from)?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::upstream(
                axum::http::StatusCode::SERVICE_UNAVAILABLE,
                format!("vector index query failed ({status}): {body}"),
            ));
        }

        let parsed: ChromaQueryResponse = resp.json().await.map_err(AppError::from)?;
        let documents = parsed.documents.into_iter().next().unwrap_or_default();
        let distances = parsed.distances.into_iter().next().unwrap_or_default();

        Ok(documents
            .into_iter()
            .zip(distances)
            .map(|(text, distance)| QueryHit { text, distance })
            .collect())
    }

    async fn add(&self, rows: &[VectorRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
        let documents: Vec<&str> = rows.iter().map(|r| r.text.as_str()).collect();
        let embeddings: Vec<&[f32]> = rows.iter().map(|r| r.embedding.as_slice()).collect();
        let metadatas: Vec<&serde_json::Value> = rows.iter().map(|r| &r.metadata).collect();

        let resp = self
            .client
            .post(format!("{}/add", self.collection_url()))
            .json(&ChromaAddRequest { ids, documents, embeddings, metadatas })
            .send()
            .await
            .map_err(AppError::from)?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::upstream(
                axum::http::StatusCode::SERVICE_UNAVAILABLE,
                format!("vector index add failed ({status}): {body}"),
            ));
        }
        Ok(())
    }

    async fn delete_collection(&self) -> Result<()> {
        let resp = self.client.delete(self.collection_url()).send().await.map_err(AppError::from)?;
        Self::not_found_is_success(resp).await
    }

    async fn existing_sources(&self) -> Result<HashSet<String>> {
        let resp = self
            .client
            .post(format!("{}/get", self.collection_url()))
            .json(&json!({ "include": ["metadatas"] }))
            .send()
            .await
            .map_err(AppError::from)?;

        if !resp.status().is_success() {
            // An absent collection has no existing sources; callers will
            // create it on write.
            return Ok(HashSet::new());
        }

        let parsed: ChromaGetResponse = resp.json().await.map_err(AppError::from)?;
        Ok(parsed
            .metadatas
            .into_iter()
            .flatten()
            .filter_map(|m| m.get("source").and_then(|s| s.as_str()).map(str::to_string))
            .collect())
    }

    fn collection_name(&self) -> &str {
        &self.collection_name
    }
}

/// File-persisted vector index for single-process (`local`) deployments.
/// Rows are appended as newline-delimited JSON; queries do a linear
/// cosine-distance scan, which is adequate at the scale this system targets
/// (spec §1's non-goals exclude distributed/clustered operation entirely).
pub struct LocalVectorIndex {
    path: PathBuf,
    collection_name: String,
    rows: RwLock<Option<Vec<VectorRow>>>,
}

impl LocalVectorIndex {
    pub fn new(base_path: String, collection_name: String) -> Self {
        let path = PathBuf::from(base_path).join(format!("{collection_name}.ndjson"));
        Self { path, collection_name, rows: RwLock::new(None) }
    }

    async fn load(&self) -> Result<Vec<VectorRow>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(contents
                .lines()
                .filter(|l| !l.trim().is_empty())
                .filter_map(|l| serde_json::from_str(l).ok())
                .collect()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(AppError::from(e)),
        }
    }

    async fn persist(&self, rows: &[VectorRow]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut buf = String::new();
        for row in rows {
            buf.push_str(&serde_json::to_string(row).map_err(|e| AppError::internal(e.to_string()))?);
            buf.push('\n');
        }
        tokio::fs::write(&self.path, buf).await?;
        Ok(())
    }

    fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        let norm_a = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        let norm_b = b.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            1.0
        } else {
            1.0 - (dot / (norm_a * norm_b))
        }
    }
}

#[async_trait]
impl VectorIndex for LocalVectorIndex {
    async fn get_or_create_collection(&self) -> Result<()> {
        let mut guard = self.rows.write().await;
        if guard.is_none() {
            *guard = Some(self.load().await?);
        }
        Ok(())
    }

    async fn query(&self, embedding: &[f32], n_results: usize) -> Result<Vec<QueryHit>> {
        self.get_or_create_collection().await?;
        let guard = self.rows.read().await;
        let rows = guard.as_ref().expect("initialized above");

        let mut scored: Vec<QueryHit> = rows
            .iter()
            .map(|row| QueryHit { text: row.text.clone(), distance: Self::cosine_distance(embedding, &row.embedding) })
            .collect();
        scored.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(n_results);
        Ok(scored)
    }

    async fn add(&self, new_rows: &[VectorRow]) -> Result<()> {
        self.get_or_create_collection().await?;
        let mut guard = self.rows.write().await;
        let rows = guard.as_mut().expect("initialized above");

        for incoming in new_rows {
            if let Some(existing) = rows.iter_mut().find(|r| r.id == incoming.id) {
                *existing = incoming.clone();
            } else {
                rows.push(incoming.clone());
            }
        }
        self.persist(rows).await
    }

    async fn delete_collection(&self) -> Result<()> {
        let mut guard = self.rows.write().await;
        *guard = Some(Vec::new());
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::from(e)),
        }
    }

    async fn existing_sources(&self) -> Result<HashSet<String>> {
        self.get_or_create_collection().await?;
        let guard = self.rows.read().await;
        let rows = guard.as_ref().expect("initialized above");
        Ok(rows.iter().filter_map(|r| r.source().map(str::to_string)).collect())
    }

    fn collection_name(&self) -> &str {
        &self.collection_name
    }
}
