use crate::error::IndexError;
use crate::models::{ChunkMetadata, DocumentChunk, ScoredChunk};
use crate::traits::VectorIndex;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    chunk_id: String,
    document_path: String,
    text: String,
    metadata: ChunkMetadata,
    embedding: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexState {
    embedder_id: String,
    dimensions: usize,
    entries: Vec<IndexEntry>,
}

/// File-backed vector index with cosine-similarity search.
///
/// All entries live in memory behind a single reader/writer lock; every
/// mutation is persisted (write-temp-then-rename) before the lock is
/// released, so a reload after a crash observes either the previous or the
/// new state of a document, never a mix.
#[derive(Debug)]
pub struct LocalVectorIndex {
    path: PathBuf,
    state: RwLock<IndexState>,
}

impl LocalVectorIndex {
    /// Opens or creates the index state file. A file that does not parse
    /// is corruption: fatal, because the manifest may claim documents
    /// whose vectors are unaccounted for. An index built under a different
    /// embedder identity or dimensionality refuses to load for the same
    /// reason.
    pub fn open(
        path: impl Into<PathBuf>,
        embedder_id: &str,
        dimensions: usize,
    ) -> Result<Self, IndexError> {
        let path = path.into();

        let state = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            let loaded: IndexState = serde_json::from_str(&raw)
                .map_err(|error| IndexError::Corrupt(error.to_string()))?;
            if loaded.embedder_id != embedder_id {
                return Err(IndexError::EmbedderMismatch {
                    expected: embedder_id.to_string(),
                    found: loaded.embedder_id,
                });
            }
            if loaded.dimensions != dimensions {
                return Err(IndexError::Dimension {
                    expected: dimensions,
                    found: loaded.dimensions,
                });
            }
            loaded
        } else {
            IndexState {
                embedder_id: embedder_id.to_string(),
                dimensions,
                entries: Vec::new(),
            }
        };

        Ok(Self {
            path,
            state: RwLock::new(state),
        })
    }

    pub async fn entry_count(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn entries_for(&self, document_path: &str) -> usize {
        self.state
            .read()
            .await
            .entries
            .iter()
            .filter(|entry| entry.document_path == document_path)
            .count()
    }

    fn persist(&self, state: &IndexState) -> Result<(), IndexError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let serialized = serde_json::to_string(state)?;
        let tmp = temp_sibling(&self.path);
        std::fs::write(&tmp, serialized)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for LocalVectorIndex {
    async fn upsert(
        &self,
        document_path: &str,
        chunks: &[DocumentChunk],
        embeddings: &[Vec<f32>],
    ) -> Result<(), IndexError> {
        if chunks.len() != embeddings.len() {
            return Err(IndexError::Corrupt(format!(
                "embedding count {} does not match chunk count {}",
                embeddings.len(),
                chunks.len()
            )));
        }

        let mut state = self.state.write().await;

        for embedding in embeddings {
            if embedding.len() != state.dimensions {
                return Err(IndexError::Dimension {
                    expected: state.dimensions,
                    found: embedding.len(),
                });
            }
        }

        let mut next = state.clone();
        next.entries
            .retain(|entry| entry.document_path != document_path);
        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            next.entries.push(IndexEntry {
                chunk_id: chunk.id.clone(),
                document_path: document_path.to_string(),
                text: chunk.text.clone(),
                metadata: chunk.metadata.clone(),
                embedding: embedding.clone(),
            });
        }

        self.persist(&next)?;
        *state = next;
        Ok(())
    }

    async fn delete(&self, document_path: &str) -> Result<(), IndexError> {
        let mut state = self.state.write().await;
        if !state
            .entries
            .iter()
            .any(|entry| entry.document_path == document_path)
        {
            return Ok(());
        }

        let mut next = state.clone();
        next.entries
            .retain(|entry| entry.document_path != document_path);
        self.persist(&next)?;
        *state = next;
        Ok(())
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>, IndexError> {
        let state = self.state.read().await;

        if query.len() != state.dimensions {
            return Err(IndexError::Dimension {
                expected: state.dimensions,
                found: query.len(),
            });
        }

        let mut hits: Vec<ScoredChunk> = state
            .entries
            .iter()
            .filter_map(|entry| {
                cosine_similarity(query, &entry.embedding).map(|score| ScoredChunk {
                    chunk_id: entry.chunk_id.clone(),
                    score,
                    text: entry.text.clone(),
                    metadata: entry.metadata.clone(),
                })
            })
            .collect();

        hits.sort_by(|left, right| {
            right
                .score
                .total_cmp(&left.score)
                .then_with(|| left.chunk_id.cmp(&right.chunk_id))
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn clear(&self) -> Result<(), IndexError> {
        let mut state = self.state.write().await;
        let mut next = state.clone();
        next.entries.clear();
        self.persist(&next)?;
        *state = next;
        Ok(())
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let x64 = f64::from(x);
        let y64 = f64::from(y);
        dot += x64 * y64;
        norm_a += x64 * x64;
        norm_b += y64 * y64;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        return None;
    }
    Some((dot / denom) as f32)
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
