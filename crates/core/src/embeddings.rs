use crate::error::ConfigError;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 128;

/// Text-to-vector capability. The same embedder identity must be used at
/// index time and query time; the index refuses to load under a different
/// identifier.
pub trait Embedder {
    /// Stable identifier persisted in the index state.
    fn id(&self) -> String;
    fn dimensions(&self) -> usize;
    fn embed(&self, text: &str) -> Vec<f32>;
}

/// Deterministic local embedder: hashed character trigrams, L2-normalized.
/// Runs without network access, which keeps ingestion and retrieval fully
/// reproducible in tests.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl Embedder for CharacterNgramEmbedder {
    fn id(&self) -> String {
        format!("char-ngram-{}", self.dimensions)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

/// Resolves a configured embedding model identifier to an embedder.
/// Accepted identifiers look like `char-ngram-128`. Anything else is a
/// startup configuration error, never silently defaulted.
pub fn embedder_for_model(model_id: &str) -> Result<CharacterNgramEmbedder, ConfigError> {
    let trimmed = model_id.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::MissingEmbeddingModel);
    }

    let dimensions = trimmed
        .strip_prefix("char-ngram-")
        .and_then(|dims| dims.parse::<usize>().ok())
        .filter(|dims| *dims > 0)
        .ok_or_else(|| ConfigError::UnknownEmbeddingModel(trimmed.to_string()))?;

    Ok(CharacterNgramEmbedder { dimensions })
}

#[cfg(test)]
mod tests {
    use super::{embedder_for_model, CharacterNgramEmbedder, Embedder};
    use crate::error::ConfigError;

    #[test]
    fn embedder_is_deterministic() {
        let embedder = CharacterNgramEmbedder::default();
        let first = embedder.embed("Incident response procedure");
        let second = embedder.embed("Incident response procedure");
        assert_eq!(first, second);
    }

    #[test]
    fn embedder_outputs_expected_length() {
        let embedder = CharacterNgramEmbedder { dimensions: 32 };
        assert_eq!(embedder.embed("abc").len(), 32);
        assert_eq!(embedder.id(), "char-ngram-32");
    }

    #[test]
    fn model_identifier_round_trips_through_factory() {
        let embedder = embedder_for_model("char-ngram-64").unwrap();
        assert_eq!(embedder.dimensions(), 64);
        assert_eq!(embedder.id(), "char-ngram-64");
    }

    #[test]
    fn unknown_model_is_a_config_error() {
        assert!(matches!(
            embedder_for_model("minilm-v2"),
            Err(ConfigError::UnknownEmbeddingModel(_))
        ));
        assert!(matches!(
            embedder_for_model(""),
            Err(ConfigError::MissingEmbeddingModel)
        ));
    }
}
