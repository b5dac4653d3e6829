use thiserror::Error;

/// Per-document extraction failures. Recovered locally: the document is
/// skipped for the run and retried on the next pass.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    Pdf(String),

    #[error("ooxml parse error: {0}")]
    Ooxml(String),

    #[error("csv parse error: {0}")]
    Csv(String),

    #[error("no extractable text: {0}")]
    Empty(String),
}

/// Vector index failures. `Corrupt` and `EmbedderMismatch` are fatal on
/// load and require a full rebuild; the rest are per-operation.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index state is corrupt: {0}")]
    Corrupt(String),

    #[error("index was built with embedder '{found}', configured embedder is '{expected}'")]
    EmbedderMismatch { expected: String, found: String },

    #[error("embedding dimension {found} does not match index dimension {expected}")]
    Dimension { expected: usize, found: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Ingestion-pass failures attributed to the run, not a single document.
/// Single-document failures surface in the report instead.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not extract {path}: {source}")]
    Extraction {
        path: String,
        #[source]
        source: ExtractError,
    },

    #[error("index write failed for {path}: {source}")]
    IndexWrite {
        path: String,
        #[source]
        source: IndexError,
    },

    #[error("manifest persistence failed: {0}")]
    Manifest(String),

    #[error("corpus root is not a directory: {0}")]
    MissingCorpus(String),
}

/// Invalid or missing configuration. Fatal at startup; nothing
/// correctness-relevant is silently defaulted.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("embedding model identifier must not be empty")]
    MissingEmbeddingModel,

    #[error("unknown embedding model: {0}")]
    UnknownEmbeddingModel(String),

    #[error("chunk max size must be greater than zero")]
    ZeroChunkSize,

    #[error("chunk overlap {overlap} must be smaller than chunk max size {max}")]
    OverlapTooLarge { overlap: usize, max: usize },

    #[error("top-k must be greater than zero")]
    ZeroTopK,

    #[error("relevance threshold {0} must be within (0, 1]")]
    InvalidThreshold(f32),
}

/// Query-stage failures at the completion-service boundary. An empty
/// retrieval is an outcome, never an error.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("completion service returned {status}: {details}")]
    Backend { status: String, details: String },

    #[error("completion response had no text")]
    EmptyCompletion,

    #[error(transparent)]
    Index(#[from] IndexError),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
