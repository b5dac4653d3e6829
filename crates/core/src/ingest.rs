use crate::chunking::build_chunks;
use crate::config::PipelineConfig;
use crate::embeddings::Embedder;
use crate::error::{IngestError, Result};
use crate::extractor::extract_segments;
use crate::manifest::Manifest;
use crate::models::{DocumentChunk, DocumentFormat, IngestionReport, ManifestDiff, SkippedDocument};
use crate::traits::VectorIndex;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// One supported file found under the corpus root.
#[derive(Debug, Clone)]
pub struct CorpusFile {
    /// Relative path from the corpus root, `/`-separated: the identity.
    pub rel_path: String,
    pub abs_path: PathBuf,
    pub format: DocumentFormat,
}

/// Recursively lists supported files under the corpus root, sorted by
/// relative path. Unsupported extensions are invisible, not errors.
pub fn scan_corpus(root: &Path) -> Result<Vec<CorpusFile>> {
    if !root.is_dir() {
        return Err(IngestError::MissingCorpus(root.display().to_string()));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).into_iter().filter_map(|item| item.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(format) = DocumentFormat::from_path(entry.path()) else {
            continue;
        };
        let rel_path = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        files.push(CorpusFile {
            rel_path,
            abs_path: entry.path().to_path_buf(),
            format,
        });
    }

    files.sort_unstable_by(|left, right| left.rel_path.cmp(&right.rel_path));
    Ok(files)
}

/// SHA-256 digest of the file contents: the document fingerprint. A hash
/// never misses a change, at worst it reprocesses an identical rewrite.
pub fn digest_file(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Converges the vector index to match the corpus on disk.
///
/// Scan → fingerprint → diff against the manifest → delete removed
/// documents → extract/chunk/embed/upsert new and changed ones. Unchanged
/// documents are never touched. Per-document failures land in the report
/// with their path and reason and are retried next run; they never block
/// the rest of the batch or corrupt already-committed manifest entries.
/// Each manifest entry commits strictly after its index mutation.
pub async fn run_ingestion<E, V>(
    config: &PipelineConfig,
    embedder: &E,
    index: &V,
    manifest: &mut Manifest,
) -> Result<IngestionReport>
where
    E: Embedder,
    V: VectorIndex + Sync,
{
    let files = scan_corpus(&config.corpus_root)?;

    let mut report = IngestionReport::default();
    let mut corpus_digests: BTreeMap<String, String> = BTreeMap::new();
    let mut by_path: BTreeMap<String, &CorpusFile> = BTreeMap::new();
    let mut unreadable: BTreeSet<String> = BTreeSet::new();

    for file in &files {
        match digest_file(&file.abs_path) {
            Ok(digest) => {
                corpus_digests.insert(file.rel_path.clone(), digest);
                by_path.insert(file.rel_path.clone(), file);
            }
            Err(error) => {
                unreadable.insert(file.rel_path.clone());
                report.skipped.push(SkippedDocument {
                    path: file.rel_path.clone(),
                    reason: error.to_string(),
                });
            }
        }
    }

    let mut diff = manifest.diff(&corpus_digests);
    retain_true_removals(&mut diff, &unreadable);

    for path in &diff.to_remove {
        match index.delete(path).await {
            Ok(()) => {
                manifest.remove(path)?;
                report.removed.push(path.clone());
            }
            Err(error) => report.skipped.push(SkippedDocument {
                path: path.clone(),
                reason: format!("index delete failed: {error}"),
            }),
        }
    }

    let mut pending: Vec<&String> = diff.to_add.iter().chain(diff.to_update.iter()).collect();
    pending.sort_unstable();

    for path in pending {
        let file = by_path[path.as_str()];
        let digest = &corpus_digests[path.as_str()];

        match ingest_document(config, embedder, index, file).await {
            Ok(chunk_count) => {
                manifest.commit(path, digest)?;
                report.processed.push(path.clone());
                report.chunks_indexed += chunk_count;
            }
            Err(error) => report.skipped.push(SkippedDocument {
                path: path.clone(),
                reason: error.to_string(),
            }),
        }
    }

    report.unchanged = corpus_digests.len() - diff.to_add.len() - diff.to_update.len();
    Ok(report)
}

/// A path the scan found but could not fingerprint is skipped for the run,
/// never treated as deleted: its committed manifest and index entries stay
/// intact until the file becomes readable again or actually disappears.
fn retain_true_removals(diff: &mut ManifestDiff, unreadable: &BTreeSet<String>) {
    diff.to_remove.retain(|path| !unreadable.contains(path));
}

async fn ingest_document<E, V>(
    config: &PipelineConfig,
    embedder: &E,
    index: &V,
    file: &CorpusFile,
) -> Result<usize>
where
    E: Embedder,
    V: VectorIndex + Sync,
{
    let segments =
        extract_segments(&file.abs_path, file.format).map_err(|source| IngestError::Extraction {
            path: file.rel_path.clone(),
            source,
        })?;

    let mut chunks: Vec<DocumentChunk> = Vec::new();
    let mut sequence = 0u64;
    for segment in &segments {
        chunks.extend(build_chunks(
            &file.rel_path,
            file.format,
            segment,
            config.chunking,
            &mut sequence,
        ));
    }

    let embeddings: Vec<Vec<f32>> = chunks.iter().map(|chunk| embedder.embed(&chunk.text)).collect();

    index
        .upsert(&file.rel_path, &chunks, &embeddings)
        .await
        .map_err(|source| IngestError::IndexWrite {
            path: file.rel_path.clone(),
            source,
        })?;

    Ok(chunks.len())
}

/// Clears the index and the manifest so the next ingestion pass treats
/// every document as new. The mandated recovery for index corruption, and
/// the "start fresh" operation.
pub async fn rebuild<V>(index: &V, manifest: &mut Manifest) -> Result<()>
where
    V: VectorIndex + Sync,
{
    index
        .clear()
        .await
        .map_err(|source| IngestError::IndexWrite {
            path: String::new(),
            source,
        })?;
    manifest.clear()
}
