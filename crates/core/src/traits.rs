use crate::error::{IndexError, QueryError};
use crate::models::{DocumentChunk, ScoredChunk};
use async_trait::async_trait;

/// Contract the pipeline requires from a vector index implementation.
///
/// `upsert` and `delete` are keyed by document path and replace or remove
/// every entry for that document as one logical operation; readers never
/// observe a half-updated document.
#[async_trait]
pub trait VectorIndex {
    async fn upsert(
        &self,
        document_path: &str,
        chunks: &[DocumentChunk],
        embeddings: &[Vec<f32>],
    ) -> Result<(), IndexError>;

    /// No-op when the document has no entries.
    async fn delete(&self, document_path: &str) -> Result<(), IndexError>;

    /// Ranked by similarity descending, ties broken by chunk id ascending,
    /// at most `k` results.
    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>, IndexError>;

    /// Drops every entry. The recovery path for a corrupt index: clear,
    /// then re-ingest with an empty manifest.
    async fn clear(&self) -> Result<(), IndexError>;
}

/// The opaque text-completion boundary. Real implementations call out over
/// the network; tests substitute a deterministic stub.
#[async_trait]
pub trait CompletionService {
    async fn complete(&self, prompt: &str) -> Result<String, QueryError>;
}
