use crate::models::{
    ChunkMetadata, ChunkingOptions, DocumentChunk, DocumentFormat, Segment,
};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

fn sentence_boundary() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.!?]\s+").expect("sentence boundary pattern is valid"))
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('\u{a0}', " ")
}

/// Splits one segment's text into bounded pieces. Sentence boundaries are
/// preferred over hard character cuts; consecutive pieces share an overlap
/// so content near a boundary stays retrievable from a neighbor.
/// Identical input and options always produce identical pieces.
pub fn split_chunks(text: &str, options: ChunkingOptions) -> Vec<String> {
    let normalized = normalize_whitespace(text);
    if normalized.is_empty() {
        return Vec::new();
    }
    if normalized.chars().count() <= options.max_chars {
        return vec![normalized];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    // All size accounting is in chars, matching hard_split and the overlap.
    let mut current_chars = 0usize;

    for sentence in split_sentences(&normalized) {
        let sentence_chars = sentence.chars().count();
        if sentence_chars > options.max_chars {
            if !current.is_empty() {
                chunks.push(current.clone());
                current.clear();
                current_chars = 0;
            }
            hard_split(sentence, options, &mut chunks);
            continue;
        }

        if !current.is_empty() && current_chars + sentence_chars + 1 > options.max_chars {
            let carried = overlap_suffix(&current, options.overlap_chars);
            chunks.push(std::mem::take(&mut current));
            current_chars = carried.chars().count();
            current = carried;
        }

        if !current.is_empty() {
            current.push(' ');
            current_chars += 1;
        }
        current.push_str(sentence);
        current_chars += sentence_chars;
    }

    if !current.is_empty() {
        if current_chars >= options.min_chars || chunks.is_empty() {
            chunks.push(current);
        } else if let Some(last) = chunks.last_mut() {
            // A short remnant is folded into its neighbor rather than lost;
            // the size bound is a target, not a hard limit.
            last.push(' ');
            last.push_str(&current);
        }
    }

    chunks
}

fn split_sentences(text: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut last = 0;
    for found in sentence_boundary().find_iter(text) {
        pieces.push(text[last..found.end()].trim());
        last = found.end();
    }
    if last < text.len() {
        pieces.push(text[last..].trim());
    }
    pieces.retain(|piece| !piece.is_empty());
    pieces
}

fn hard_split(text: &str, options: ChunkingOptions, out: &mut Vec<String>) {
    let chars: Vec<char> = text.chars().collect();
    let step = options
        .max_chars
        .saturating_sub(options.overlap_chars)
        .max(1);
    let mut start = 0;
    while start < chars.len() {
        let end = (start + options.max_chars).min(chars.len());
        out.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
}

fn overlap_suffix(chunk: &str, overlap_chars: usize) -> String {
    if overlap_chars == 0 {
        return String::new();
    }
    let chars: Vec<char> = chunk.chars().collect();
    let start = chars.len().saturating_sub(overlap_chars);
    let suffix: String = chars[start..].iter().collect();
    // Trim up to the first space so the carried overlap starts on a word.
    match suffix.find(' ') {
        Some(pos) if pos + 1 < suffix.len() => suffix[pos + 1..].to_string(),
        _ => suffix,
    }
}

/// Turns a segment into chunks carrying the document's identity and a
/// running per-document sequence number.
pub fn build_chunks(
    source_path: &str,
    format: DocumentFormat,
    segment: &Segment,
    options: ChunkingOptions,
    sequence: &mut u64,
) -> Vec<DocumentChunk> {
    let mut chunks = Vec::new();
    for text in split_chunks(&segment.text, options) {
        let id = make_chunk_id(source_path, &segment.position.label(), *sequence, &text);
        chunks.push(DocumentChunk {
            id,
            text,
            metadata: ChunkMetadata {
                source_path: source_path.to_string(),
                format,
                position: segment.position,
                sequence: *sequence,
            },
        });
        *sequence += 1;
    }
    chunks
}

fn make_chunk_id(source_path: &str, position: &str, sequence: u64, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_path.as_bytes());
    hasher.update([0]);
    hasher.update(position.as_bytes());
    hasher.update(sequence.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
