pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod index;
pub mod ingest;
pub mod manifest;
pub mod models;
pub mod query;
pub mod retriever;
pub mod traits;

pub use chunking::{build_chunks, normalize_whitespace, split_chunks};
pub use config::PipelineConfig;
pub use embeddings::{
    embedder_for_model, CharacterNgramEmbedder, Embedder, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{ConfigError, ExtractError, IndexError, IngestError, QueryError};
pub use extractor::extract_segments;
pub use index::LocalVectorIndex;
pub use ingest::{rebuild, run_ingestion, scan_corpus, CorpusFile};
pub use manifest::Manifest;
pub use models::{
    ChunkMetadata, ChunkingOptions, ConversationTurn, DocumentChunk, DocumentFormat,
    FingerprintRecord, IngestionReport, ManifestDiff, RetrievalOutcome, ScoredChunk, Segment,
    SegmentPosition, SkippedDocument,
};
pub use query::{
    compose_prompt, AnswerOutcome, HttpCompletionService, QueryEngine, SessionMemory,
};
pub use retriever::Retriever;
pub use traits::{CompletionService, VectorIndex};
