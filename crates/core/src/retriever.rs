use crate::config::PipelineConfig;
use crate::embeddings::Embedder;
use crate::error::IndexError;
use crate::models::RetrievalOutcome;
use crate::traits::VectorIndex;

/// Embeds a query, runs nearest-neighbor search, and applies optional
/// relevance gating.
///
/// Precondition: the embedder must carry the same identity the index was
/// built with. [`crate::index::LocalVectorIndex::open`] enforces this at
/// load time; a mismatch is a configuration error, never silently
/// tolerated.
pub struct Retriever<'a, E, V> {
    embedder: &'a E,
    index: &'a V,
    top_k: usize,
    relevance_threshold: Option<f32>,
}

impl<'a, E, V> Retriever<'a, E, V>
where
    E: Embedder,
    V: VectorIndex + Sync,
{
    pub fn new(embedder: &'a E, index: &'a V, config: &PipelineConfig) -> Self {
        Self {
            embedder,
            index,
            top_k: config.top_k,
            relevance_threshold: config.relevance_threshold,
        }
    }

    /// Distinguishes three outcomes so callers can answer honestly:
    /// relevant chunks, chunks found but all gated out, or nothing at all.
    pub async fn retrieve(&self, query_text: &str) -> Result<RetrievalOutcome, IndexError> {
        let query = self.embedder.embed(query_text);
        let hits = self.index.search(&query, self.top_k).await?;

        if hits.is_empty() {
            return Ok(RetrievalOutcome::NoMatches);
        }

        let Some(threshold) = self.relevance_threshold else {
            return Ok(RetrievalOutcome::Relevant(hits));
        };

        let candidates = hits.len();
        let best_score = hits
            .iter()
            .map(|hit| hit.score)
            .fold(f32::NEG_INFINITY, f32::max);
        let passing: Vec<_> = hits.into_iter().filter(|hit| hit.score >= threshold).collect();

        if passing.is_empty() {
            Ok(RetrievalOutcome::Filtered {
                candidates,
                best_score,
            })
        } else {
            Ok(RetrievalOutcome::Relevant(passing))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::index::LocalVectorIndex;
    use crate::manifest::Manifest;
    use tempfile::tempdir;

    async fn indexed_fixture(dir: &std::path::Path) -> (PipelineConfig, CharacterNgramEmbedder, LocalVectorIndex) {
        let corpus = dir.join("docs");
        std::fs::create_dir(&corpus).unwrap();
        std::fs::write(corpus.join("a.txt"), "cats are mammals").unwrap();
        std::fs::write(corpus.join("b.txt"), "dogs are mammals").unwrap();

        let config = PipelineConfig::new(corpus, dir.join("state"), "char-ngram-128");
        let embedder = CharacterNgramEmbedder::default();
        let index = LocalVectorIndex::open(config.index_path(), &embedder.id(), 128).unwrap();
        let mut manifest = Manifest::load(config.manifest_path());
        crate::ingest::run_ingestion(&config, &embedder, &index, &mut manifest)
            .await
            .unwrap();
        (config, embedder, index)
    }

    #[tokio::test]
    async fn closest_chunk_wins_at_k_one() {
        let dir = tempdir().unwrap();
        let (mut config, embedder, index) = indexed_fixture(dir.path()).await;
        config.top_k = 1;

        let retriever = Retriever::new(&embedder, &index, &config);
        let outcome = retriever.retrieve("what is a cat").await.unwrap();

        match outcome {
            RetrievalOutcome::Relevant(hits) => {
                assert_eq!(hits.len(), 1);
                assert_eq!(hits[0].metadata.source_path, "a.txt");
            }
            other => panic!("expected relevant hits, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_threshold_signals_filtered_not_empty() {
        let dir = tempdir().unwrap();
        let (mut config, embedder, index) = indexed_fixture(dir.path()).await;
        config.relevance_threshold = Some(0.99);

        let retriever = Retriever::new(&embedder, &index, &config);
        let outcome = retriever.retrieve("completely unrelated query").await.unwrap();

        match outcome {
            RetrievalOutcome::Filtered {
                candidates,
                best_score,
            } => {
                assert!(candidates > 0);
                assert!(best_score < 0.99);
            }
            other => panic!("expected filtered outcome, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn passing_threshold_returns_only_passing_chunks() {
        let dir = tempdir().unwrap();
        let (mut config, embedder, index) = indexed_fixture(dir.path()).await;
        config.relevance_threshold = Some(0.05);

        let retriever = Retriever::new(&embedder, &index, &config);
        let outcome = retriever.retrieve("cats are mammals").await.unwrap();

        match outcome {
            RetrievalOutcome::Relevant(hits) => {
                assert!(hits.iter().all(|hit| hit.score >= 0.05));
                assert_eq!(hits[0].metadata.source_path, "a.txt");
            }
            other => panic!("expected relevant hits, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_index_reports_no_matches() {
        let dir = tempdir().unwrap();
        let config = PipelineConfig::new(dir.path().join("docs"), dir.path().join("state"), "char-ngram-128");
        let embedder = CharacterNgramEmbedder::default();
        let index = LocalVectorIndex::open(config.index_path(), &embedder.id(), 128).unwrap();

        let retriever = Retriever::new(&embedder, &index, &config);
        let outcome = retriever.retrieve("anything").await.unwrap();
        assert!(matches!(outcome, RetrievalOutcome::NoMatches));
    }
}
