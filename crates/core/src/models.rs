use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Supported document formats, resolved from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentFormat {
    Pdf,
    Word,
    Spreadsheet,
    Csv,
    Text,
}

impl DocumentFormat {
    /// Resolves the format from a path's extension. Returns `None` for
    /// unsupported extensions; callers treat those files as invisible.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension().and_then(|ext| ext.to_str())?;
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Word),
            "xlsx" => Some(Self::Spreadsheet),
            "csv" => Some(Self::Csv),
            "txt" => Some(Self::Text),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Word => "docx",
            Self::Spreadsheet => "xlsx",
            Self::Csv => "csv",
            Self::Text => "txt",
        }
    }
}

/// Where an extracted segment sits inside its source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentPosition {
    Page(u32),
    Section(u32),
    Cell { sheet: u32, row: u32 },
    Row(u32),
    Paragraph(u32),
}

impl SegmentPosition {
    pub fn label(&self) -> String {
        match self {
            Self::Page(n) => format!("page {n}"),
            Self::Section(n) => format!("section {n}"),
            Self::Cell { sheet, row } => format!("sheet {sheet} row {row}"),
            Self::Row(n) => format!("row {n}"),
            Self::Paragraph(n) => format!("paragraph {n}"),
        }
    }
}

/// One extracted unit of text with its position inside the document.
#[derive(Debug, Clone)]
pub struct Segment {
    pub text: String,
    pub position: SegmentPosition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Relative path from the corpus root; the document's identity.
    pub source_path: String,
    pub format: DocumentFormat,
    pub position: SegmentPosition,
    /// Sequence number of the chunk within its document.
    pub sequence: u64,
}

/// The retrieval granularity: a bounded piece of extracted text.
///
/// Ids are derived from the owning document's path, position, sequence
/// number, and the chunk text itself, so re-chunking identical content
/// always reproduces the same ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// A chunk returned from a nearest-neighbor search, with its similarity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk_id: String,
    pub score: f32,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// Outcome of a retrieval pass, distinguishing "found and usable" from
/// "found but below the relevance threshold" from "nothing matched".
#[derive(Debug, Clone)]
pub enum RetrievalOutcome {
    Relevant(Vec<ScoredChunk>),
    Filtered { candidates: usize, best_score: f32 },
    NoMatches,
}

/// Manifest entry: the content digest a document carried when its chunks
/// were last committed to the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FingerprintRecord {
    pub digest: String,
    pub indexed_at: DateTime<Utc>,
}

/// Disjoint sets produced by diffing a corpus scan against the manifest.
/// A path appears in at most one of the three sets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManifestDiff {
    pub to_add: Vec<String>,
    pub to_update: Vec<String>,
    pub to_remove: Vec<String>,
}

impl ManifestDiff {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_update.is_empty() && self.to_remove.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct SkippedDocument {
    pub path: String,
    pub reason: String,
}

/// Per-run accounting for an ingestion pass.
#[derive(Debug, Clone, Default)]
pub struct IngestionReport {
    pub processed: Vec<String>,
    pub removed: Vec<String>,
    pub skipped: Vec<SkippedDocument>,
    pub unchanged: usize,
    pub chunks_indexed: usize,
}

/// Knobs consumed by the chunker.
#[derive(Debug, Clone, Copy)]
pub struct ChunkingOptions {
    pub max_chars: usize,
    pub overlap_chars: usize,
    pub min_chars: usize,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            max_chars: 1_000,
            overlap_chars: 150,
            min_chars: 40,
        }
    }
}

/// One question/answer exchange kept in the session memory log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub question: String,
    pub answer: String,
    pub asked_at: DateTime<Utc>,
}
