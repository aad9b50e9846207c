//! Shared library for the RAG platform services.
//!
//! Provides configuration, error types, the deterministic embedder, the
//! vector-index client, the recursive-character chunker, PDF extraction,
//! HTTP client helpers, and metrics registration used by all four services.

pub mod chunker;
pub mod config;
pub mod embeddings;
pub mod errors;
pub mod http;
pub mod metrics;
pub mod pdf;
pub mod vector_index;

pub use embeddings::Embedder;
pub use errors::{AppError, Result};
pub use vector_index::VectorIndex;

/// Application version, surfaced in health/status responses.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model name (overridable via `EMBEDDING_MODEL_NAME`).
pub const DEFAULT_EMBEDDING_MODEL: &str = "all-MiniLM-L6-v2";

/// Default embedding dimension for the deterministic embedder.
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 384;
