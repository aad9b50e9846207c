//! Configuration management for the RAG platform services.
//!
//! Each service loads its own config struct from environment variables
//! (optionally layered over a `.env` file via `dotenvy`), using the `config`
//! crate for parsing and defaulting. Field names and bounds match §6 of the
//! specification exactly.

use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};

/// How the vector index is reached.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChromaMode {
    Local,
    #[default]
    Docker,
}

/// Configuration shared by every service that talks to the vector index
/// and embeds text: Ingestion and Retrieval.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VectorIndexConfig {
    #[serde(default = "default_embedding_model_name")]
    pub embedding_model_name: String,

    #[serde(default)]
    pub chroma_mode: ChromaMode,

    pub chroma_path: Option<String>,

    #[serde(default = "default_chroma_host")]
    pub chroma_host: String,

    #[serde(default = "default_chroma_port")]
    pub chroma_port: u16,

    #[serde(default = "default_collection_name")]
    pub chroma_collection_name: String,
}

impl VectorIndexConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chroma_collection_name.trim().is_empty() {
            return Err(ConfigError::Message(
                "CHROMA_COLLECTION_NAME must be non-empty".into(),
            ));
        }
        if self.chroma_mode == ChromaMode::Local && self.chroma_path.is_none() {
            return Err(ConfigError::Message(
                "CHROMA_PATH is required when CHROMA_MODE=local".into(),
            ));
        }
        Ok(())
    }
}

/// Ingestion service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestionConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_ingestion_port")]
    pub port: u16,

    #[serde(default = "default_source_directory")]
    pub source_directory: String,

    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u32,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    #[serde(default)]
    pub clean_collection_before_ingest: bool,

    #[serde(flatten)]
    pub vector_index: VectorIndexConfig,
}

impl IngestionConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let config = base_builder().build()?;
        let parsed: Self = config.try_deserialize()?;
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=500).contains(&self.max_file_size_mb) {
            return Err(ConfigError::Message(
                "MAX_FILE_SIZE_MB must be between 1 and 500".into(),
            ));
        }
        if !(self.chunk_size > 100 && self.chunk_size <= 4000) {
            return Err(ConfigError::Message(
                "CHUNK_SIZE must satisfy 100 < n <= 4000".into(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::Message(
                "CHUNK_OVERLAP must be strictly less than CHUNK_SIZE".into(),
            ));
        }
        self.vector_index.validate()
    }
}

/// Retrieval service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_retrieval_port")]
    pub port: u16,

    #[serde(default = "default_top_k")]
    pub top_k_results: usize,
    #[serde(default = "default_distance_threshold")]
    pub distance_threshold: f32,

    #[serde(flatten)]
    pub vector_index: VectorIndexConfig,
}

impl RetrievalConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let config = base_builder().build()?;
        let parsed: Self = config.try_deserialize()?;
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.top_k_results == 0 {
            return Err(ConfigError::Message(
                "TOP_K_RESULTS must be a positive integer".into(),
            ));
        }
        self.vector_index.validate()
    }
}

/// Generation service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenerationConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_generation_port")]
    pub port: u16,

    #[serde(default = "default_llm_provider")]
    pub llm_provider: String,
    #[serde(default = "default_llm_model_name")]
    pub llm_model_name: String,
    #[serde(default = "default_llm_temperature")]
    pub llm_temperature: f32,
    #[serde(default = "default_llm_max_tokens")]
    pub llm_max_tokens: u32,
    pub llm_api_key: Option<String>,
    pub llm_api_base: Option<String>,
}

impl GenerationConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let config = base_builder().build()?;
        config.try_deserialize()
    }
}

/// Orchestrator (RAG) service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_orchestrator_port")]
    pub port: u16,

    #[serde(default = "default_retrieval_url")]
    pub retrieval_service_url: String,
    #[serde(default = "default_generation_url")]
    pub generation_service_url: String,
    #[serde(default = "default_ingestion_url")]
    pub ingestion_service_url: String,
}

impl OrchestratorConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let config = base_builder().build()?;
        config.try_deserialize()
    }
}

fn base_builder() -> config::ConfigBuilder<config::builder::DefaultState> {
    Config::builder().add_source(Environment::default().try_parsing(true))
}

// Default value functions, mirroring the original service's field defaults.
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_ingestion_port() -> u16 {
    8001
}
fn default_retrieval_port() -> u16 {
    8002
}
fn default_generation_port() -> u16 {
    8003
}
fn default_orchestrator_port() -> u16 {
    8000
}
fn default_source_directory() -> String {
    "/app/documents".to_string()
}
fn default_max_file_size_mb() -> u32 {
    50
}
fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    150
}
fn default_embedding_model_name() -> String {
    "all-MiniLM-L6-v2".to_string()
}
fn default_chroma_host() -> String {
    "chromadb".to_string()
}
fn default_chroma_port() -> u16 {
    8000
}
fn default_collection_name() -> String {
    "support_docs".to_string()
}
fn default_top_k() -> usize {
    5
}
fn default_distance_threshold() -> f32 {
    1.0
}
fn default_llm_provider() -> String {
    "openai".to_string()
}
fn default_llm_model_name() -> String {
    "gpt-4o-mini".to_string()
}
fn default_llm_temperature() -> f32 {
    0.0
}
fn default_llm_max_tokens() -> u32 {
    1024
}
fn default_retrieval_url() -> String {
    "http://localhost:8002".to_string()
}
fn default_generation_url() -> String {
    "http://localhost:8003".to_string()
}
fn default_ingestion_url() -> String {
    "http://localhost:8001".to_string()
}
