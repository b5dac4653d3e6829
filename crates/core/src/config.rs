use crate::error::ConfigError;
use crate::models::ChunkingOptions;
use std::path::PathBuf;

/// Configuration surface consumed by the pipeline. Constructed explicitly
/// and validated once at startup; there is no global state.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root folder scanned recursively for documents.
    pub corpus_root: PathBuf,
    /// Directory holding the cache manifest and the vector index state.
    pub state_dir: PathBuf,
    /// Identifier of the embedding model used for both indexing and
    /// querying. An index built under a different identifier refuses to
    /// load.
    pub embedding_model: String,
    pub chunking: ChunkingOptions,
    /// Number of nearest neighbors fetched per query.
    pub top_k: usize,
    /// Strict relevance mode: results scoring below this are suppressed.
    pub relevance_threshold: Option<f32>,
}

impl PipelineConfig {
    pub fn new(
        corpus_root: impl Into<PathBuf>,
        state_dir: impl Into<PathBuf>,
        embedding_model: impl Into<String>,
    ) -> Self {
        Self {
            corpus_root: corpus_root.into(),
            state_dir: state_dir.into(),
            embedding_model: embedding_model.into(),
            chunking: ChunkingOptions::default(),
            top_k: 8,
            relevance_threshold: None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.embedding_model.trim().is_empty() {
            return Err(ConfigError::MissingEmbeddingModel);
        }
        if self.chunking.max_chars == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        if self.chunking.overlap_chars >= self.chunking.max_chars {
            return Err(ConfigError::OverlapTooLarge {
                overlap: self.chunking.overlap_chars,
                max: self.chunking.max_chars,
            });
        }
        if self.top_k == 0 {
            return Err(ConfigError::ZeroTopK);
        }
        if let Some(threshold) = self.relevance_threshold {
            if !(threshold > 0.0 && threshold <= 1.0) {
                return Err(ConfigError::InvalidThreshold(threshold));
            }
        }
        Ok(())
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.state_dir.join("manifest.json")
    }

    pub fn index_path(&self) -> PathBuf {
        self.state_dir.join("index.json")
    }
}
