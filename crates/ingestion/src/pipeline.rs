//! The background ingestion job: load -> split -> embed -> write.

use backoff::{future::retry, ExponentialBackoff};
use rag_common::chunker::{self, ChunkingConfig};
use rag_common::config::IngestionConfig;
use rag_common::embeddings::Embedder;
use rag_common::pdf;
use rag_common::vector_index::{VectorIndex, VectorRow};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use walkdir_pdfs::find_pdfs;

/// Batch size for writes to the vector collection.
const WRITE_BATCH_SIZE: usize = 64;

pub struct PipelineOutcome {
    pub documents_processed: usize,
    pub chunks_added: usize,
    pub errors: Vec<String>,
}

/// Run one ingestion pass: optional wipe, load, split, embed, write.
pub async fn run(
    config: &IngestionConfig,
    index: &Arc<dyn VectorIndex>,
    embedder: &Arc<dyn Embedder>,
) -> PipelineOutcome {
    let mut errors = Vec::new();

    if config.clean_collection_before_ingest {
        if let Err(e) = index.delete_collection().await {
            warn!(error = %e, "failed to clean collection before ingest");
            errors.push(format!("Failed to delete collection: {e}"));
        }
        if let Err(e) = index.get_or_create_collection().await {
            errors.push(format!("Failed to recreate collection: {e}"));
            return PipelineOutcome {
                documents_processed: 0,
                chunks_added: 0,
                errors,
            };
        }
    }

    let already_processed = match index.existing_sources().await {
        Ok(set) => set,
        Err(e) => {
            errors.push(format!("Failed to read existing sources: {e}"));
            return PipelineOutcome {
                documents_processed: 0,
                chunks_added: 0,
                errors,
            };
        }
    };

    let documents = load_documents(&config.source_directory, &already_processed, &mut errors);
    let documents_processed = documents.len();
    if documents.is_empty() {
        info!("no new document content loaded, ingestion finished");
        return PipelineOutcome {
            documents_processed,
            chunks_added: 0,
            errors,
        };
    }

    let chunking = ChunkingConfig {
        chunk_size: config.chunk_size,
        chunk_overlap: config.chunk_overlap,
    };
    let rows = split_and_embed(&documents, &chunking, embedder.as_ref(), &mut errors).await;
    if rows.is_empty() {
        warn!("no chunks created after splitting");
        return PipelineOutcome {
            documents_processed,
            chunks_added: 0,
            errors,
        };
    }

    let chunks_added = write_batches(index, rows, &mut errors).await;

    info!(
        documents_processed,
        chunks_added, "ingestion pipeline run finished"
    );
    PipelineOutcome {
        documents_processed,
        chunks_added,
        errors,
    }
}

struct LoadedDocument {
    source: String,
    text: String,
}

fn load_documents(
    source_directory: &str,
    already_processed: &std::collections::HashSet<String>,
    errors: &mut Vec<String>,
) -> Vec<LoadedDocument> {
    let root = Path::new(source_directory);
    if !root.exists() || !root.is_dir() {
        warn!(path = source_directory, "source directory not found");
        return Vec::new();
    }

    let mut documents = Vec::new();
    for path in find_pdfs(root) {
        let file_name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n.to_string(),
            None => continue,
        };
        if already_processed.contains(&file_name) {
            continue;
        }
        match pdf::extract_text(&path) {
            Ok(Some(text)) => documents.push(LoadedDocument {
                source: file_name,
                text,
            }),
            Ok(None) => {
                warn!(file = %file_name, "dropped document with empty or whitespace-only text");
            }
            Err(e) => {
                warn!(file = %file_name, error = %e, "failed to extract PDF text");
                errors.push(format!("Failed to load {file_name}: {e}"));
            }
        }
    }
    documents
}

async fn split_and_embed(
    documents: &[LoadedDocument],
    chunking: &ChunkingConfig,
    embedder: &dyn Embedder,
    errors: &mut Vec<String>,
) -> Vec<VectorRow> {
    let mut rows = Vec::new();
    for doc in documents {
        for chunk in chunker::split(&doc.text, chunking) {
            let embedding = match embedder.embed(&chunk.text).await {
                Ok(v) => v,
                Err(e) => {
                    warn!(source = %doc.source, error = %e, "failed to embed chunk");
                    errors.push(format!("Failed to embed chunk from {}: {e}", doc.source));
                    continue;
                }
            };
            rows.push(VectorRow {
                id: chunker::chunk_id(&doc.source, chunk.start_index),
                text: chunk.text,
                embedding,
                metadata: json!({
                    "source": doc.source,
                    "start_index": chunk.start_index,
                }),
            });
        }
    }
    rows
}

async fn write_batches(
    index: &Arc<dyn VectorIndex>,
    rows: Vec<VectorRow>,
    errors: &mut Vec<String>,
) -> usize {
    let mut added = 0;
    for batch in rows.chunks(WRITE_BATCH_SIZE) {
        let batch_len = batch.len();
        let index = index.clone();

        let op = || {
            let index = index.clone();
            let batch = batch.to_vec();
            async move { index.add(&batch).await.map_err(backoff::Error::transient) }
        };

        let backoff_policy = ExponentialBackoff {
            initial_interval: Duration::from_millis(200),
            max_interval: Duration::from_secs(2),
            max_elapsed_time: Some(Duration::from_secs(10)),
            ..ExponentialBackoff::default()
        };

        match retry(backoff_policy, op).await {
            Ok(()) => added += batch_len,
            Err(e) => {
                warn!(error = %e, batch_len, "failed to write batch after retries");
                errors.push(format!("Failed to add some or all chunks to the vector store: {e}"));
            }
        }
    }
    added
}

mod walkdir_pdfs {
    use std::path::{Path, PathBuf};

    /// Recursively enumerate `*.pdf` files under `root`, without following symlinks.
    pub fn find_pdfs(root: &Path) -> Vec<PathBuf> {
        let mut out = Vec::new();
        walk(root, &mut out);
        out.sort();
        out
    }

    fn walk(dir: &Path, out: &mut Vec<PathBuf>) {
        let entries = match std::fs::read_dir(dir) {
            Ok(e) => e,
            Err(_) => return,
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                walk(&path, out);
            } else if path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("pdf"))
                .unwrap_or(false)
            {
                out.push(path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_pdfs_is_recursive_and_case_insensitive() {
        let dir = tempfile_dir("find-pdfs");
        std::fs::create_dir_all(dir.join("sub")).unwrap();
        std::fs::write(dir.join("a.pdf"), b"x").unwrap();
        std::fs::write(dir.join("sub/b.PDF"), b"x").unwrap();
        std::fs::write(dir.join("c.txt"), b"x").unwrap();

        let found = walkdir_pdfs::find_pdfs(&dir);
        assert_eq!(found.len(), 2);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn split_and_embed_preserves_source_metadata() {
        let docs = vec![LoadedDocument {
            source: "paper.pdf".to_string(),
            text: "a".repeat(250),
        }];
        let chunking = ChunkingConfig {
            chunk_size: 100,
            chunk_overlap: 20,
        };
        let embedder = rag_common::embeddings::DeterministicEmbedder::new("test-model", 16);
        let mut errors = Vec::new();
        let rows = split_and_embed(&docs, &chunking, &embedder, &mut errors).await;
        assert!(!rows.is_empty());
        assert!(errors.is_empty());
        for row in &rows {
            assert_eq!(row.source(), Some("paper.pdf"));
            assert!(row.id.starts_with("paper.pdf_chunk_"));
        }
    }

    fn tempfile_dir(label: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("rag-ingestion-test-{}-{}", std::process::id(), label));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
