use crate::embeddings::Embedder;
use crate::error::QueryError;
use crate::models::{ConversationTurn, RetrievalOutcome, ScoredChunk};
use crate::retriever::Retriever;
use crate::traits::{CompletionService, VectorIndex};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

/// Append/read log of one conversation, keyed by session id.
#[derive(Debug, Clone)]
pub struct SessionMemory {
    pub session_id: Uuid,
    turns: Vec<ConversationTurn>,
}

impl SessionMemory {
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            turns: Vec::new(),
        }
    }

    pub fn append(&mut self, question: &str, answer: &str) {
        self.turns.push(ConversationTurn {
            question: question.to_string(),
            answer: answer.to_string(),
            asked_at: Utc::now(),
        });
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// Last `limit` exchanges rendered for prompt inclusion.
    pub fn rendered_history(&self, limit: usize) -> String {
        let start = self.turns.len().saturating_sub(limit);
        self.turns[start..]
            .iter()
            .map(|turn| format!("Q: {}\nA: {}", turn.question, turn.answer))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for SessionMemory {
    fn default() -> Self {
        Self::new()
    }
}

/// Final answer states the query stage reports, mirroring the retrieval
/// outcomes so a caller never fabricates an answer when context was
/// filtered out or absent.
#[derive(Debug, Clone)]
pub enum AnswerOutcome {
    Answered {
        text: String,
        /// Source path and similarity of each chunk that backed the answer.
        sources: Vec<(String, f32)>,
    },
    /// Chunks existed but none passed the relevance threshold.
    NoRelevantContext { candidates: usize, best_score: f32 },
    /// The index had nothing at all for this query.
    NoMatches,
}

/// Builds the completion prompt from retrieved chunks, conversation
/// history, and the question. Instructs the model to stay inside the
/// provided context and to admit when the context does not answer.
pub fn compose_prompt(question: &str, chunks: &[ScoredChunk], history: &str) -> String {
    let mut context = String::new();
    for chunk in chunks {
        context.push_str(&format!(
            "[{}, {}]\n{}\n\n",
            chunk.metadata.source_path,
            chunk.metadata.position.label(),
            chunk.text
        ));
    }

    let mut prompt = String::from(
        "You are a document assistant. Answer using ONLY the document context below. \
         If the context does not contain the answer, reply exactly: \
         \"No related information is present in the documents.\"\n\n",
    );
    prompt.push_str("Document context:\n");
    prompt.push_str(&context);
    if !history.is_empty() {
        prompt.push_str("Conversation so far:\n");
        prompt.push_str(history);
        prompt.push_str("\n\n");
    }
    prompt.push_str(&format!("Question: {question}\n"));
    prompt
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    text: Option<String>,
}

/// HTTP implementation of the completion boundary: POSTs the prompt as
/// JSON and expects `{"text": "..."}` back.
pub struct HttpCompletionService {
    endpoint: Url,
    model: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpCompletionService {
    pub fn new(
        endpoint: &str,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self, QueryError> {
        Ok(Self {
            endpoint: Url::parse(endpoint)?,
            model: model.into(),
            api_key,
            client: reqwest::Client::new(),
        })
    }
}

#[async_trait]
impl CompletionService for HttpCompletionService {
    async fn complete(&self, prompt: &str) -> Result<String, QueryError> {
        let payload = CompletionRequest {
            model: &self.model,
            prompt,
        };

        let mut request = self.client.post(self.endpoint.clone()).json(&payload);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(QueryError::Backend {
                status: response.status().to_string(),
                details: response.text().await.unwrap_or_default(),
            });
        }

        let parsed: CompletionResponse = response.json().await?;
        let text = parsed
            .text
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or(QueryError::EmptyCompletion)?;
        Ok(text)
    }
}

/// Number of past exchanges carried into each prompt.
const HISTORY_WINDOW: usize = 10;

/// Ties retrieval and completion together for one session.
pub struct QueryEngine<'a, E, V, C> {
    retriever: Retriever<'a, E, V>,
    completion: &'a C,
}

impl<'a, E, V, C> QueryEngine<'a, E, V, C>
where
    E: Embedder,
    V: VectorIndex + Sync,
    C: CompletionService,
{
    pub fn new(retriever: Retriever<'a, E, V>, completion: &'a C) -> Self {
        Self {
            retriever,
            completion,
        }
    }

    /// Retrieves context for `question`, and only when relevant context
    /// exists, calls the completion service and appends the exchange to
    /// the session log. Gated-out and empty retrievals are reported as
    /// such, never answered from thin air.
    pub async fn answer(
        &self,
        question: &str,
        memory: &mut SessionMemory,
    ) -> Result<AnswerOutcome, QueryError> {
        let chunks = match self.retriever.retrieve(question).await? {
            RetrievalOutcome::Relevant(chunks) => chunks,
            RetrievalOutcome::Filtered {
                candidates,
                best_score,
            } => {
                return Ok(AnswerOutcome::NoRelevantContext {
                    candidates,
                    best_score,
                })
            }
            RetrievalOutcome::NoMatches => return Ok(AnswerOutcome::NoMatches),
        };

        let history = memory.rendered_history(HISTORY_WINDOW);
        let prompt = compose_prompt(question, &chunks, &history);
        let text = self.completion.complete(&prompt).await?;

        memory.append(question, &text);

        let sources = chunks
            .iter()
            .map(|chunk| (chunk.metadata.source_path.clone(), chunk.score))
            .collect();
        Ok(AnswerOutcome::Answered { text, sources })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::index::LocalVectorIndex;
    use crate::manifest::Manifest;
    use tempfile::tempdir;

    struct StubCompletion {
        reply: String,
    }

    #[async_trait]
    impl CompletionService for StubCompletion {
        async fn complete(&self, prompt: &str) -> Result<String, QueryError> {
            assert!(prompt.contains("Document context:"));
            Ok(self.reply.clone())
        }
    }

    struct FailingCompletion;

    #[async_trait]
    impl CompletionService for FailingCompletion {
        async fn complete(&self, _prompt: &str) -> Result<String, QueryError> {
            panic!("completion service must not be called without relevant context");
        }
    }

    async fn indexed_fixture(
        dir: &std::path::Path,
    ) -> (PipelineConfig, CharacterNgramEmbedder, LocalVectorIndex) {
        let corpus = dir.join("docs");
        std::fs::create_dir(&corpus).unwrap();
        std::fs::write(corpus.join("a.txt"), "cats are mammals").unwrap();

        let config = PipelineConfig::new(corpus, dir.join("state"), "char-ngram-128");
        let embedder = CharacterNgramEmbedder::default();
        let index = LocalVectorIndex::open(config.index_path(), &embedder.id(), 128).unwrap();
        let mut manifest = Manifest::load(config.manifest_path());
        crate::ingest::run_ingestion(&config, &embedder, &index, &mut manifest)
            .await
            .unwrap();
        (config, embedder, index)
    }

    #[test]
    fn prompt_carries_context_history_and_question() {
        let chunks = vec![ScoredChunk {
            chunk_id: "c1".to_string(),
            score: 0.9,
            text: "cats are mammals".to_string(),
            metadata: crate::models::ChunkMetadata {
                source_path: "a.txt".to_string(),
                format: crate::models::DocumentFormat::Text,
                position: crate::models::SegmentPosition::Paragraph(1),
                sequence: 0,
            },
        }];
        let prompt = compose_prompt("what is a cat", &chunks, "Q: hi\nA: hello");
        assert!(prompt.contains("cats are mammals"));
        assert!(prompt.contains("[a.txt, paragraph 1]"));
        assert!(prompt.contains("Q: hi"));
        assert!(prompt.contains("Question: what is a cat"));
    }

    #[test]
    fn memory_windows_the_rendered_history() {
        let mut memory = SessionMemory::new();
        for i in 0..5 {
            memory.append(&format!("q{i}"), &format!("a{i}"));
        }
        let rendered = memory.rendered_history(2);
        assert!(rendered.contains("q3") && rendered.contains("q4"));
        assert!(!rendered.contains("q0"));
        assert_eq!(memory.turns().len(), 5);
    }

    #[tokio::test]
    async fn answered_outcome_carries_sources_and_updates_memory() {
        let dir = tempdir().unwrap();
        let (config, embedder, index) = indexed_fixture(dir.path()).await;
        let completion = StubCompletion {
            reply: "Cats are mammals.".to_string(),
        };

        let engine = QueryEngine::new(Retriever::new(&embedder, &index, &config), &completion);
        let mut memory = SessionMemory::new();
        let outcome = engine.answer("what is a cat", &mut memory).await.unwrap();

        match outcome {
            AnswerOutcome::Answered { text, sources } => {
                assert_eq!(text, "Cats are mammals.");
                assert_eq!(sources[0].0, "a.txt");
            }
            other => panic!("expected an answer, got {other:?}"),
        }
        assert_eq!(memory.turns().len(), 1);
    }

    #[tokio::test]
    async fn gated_retrieval_never_reaches_the_completion_service() {
        let dir = tempdir().unwrap();
        let (mut config, embedder, index) = indexed_fixture(dir.path()).await;
        config.relevance_threshold = Some(0.99);

        let engine = QueryEngine::new(Retriever::new(&embedder, &index, &config), &FailingCompletion);
        let mut memory = SessionMemory::new();
        let outcome = engine
            .answer("entirely unrelated question", &mut memory)
            .await
            .unwrap();

        assert!(matches!(outcome, AnswerOutcome::NoRelevantContext { .. }));
        assert!(memory.turns().is_empty());
    }

    #[tokio::test]
    async fn empty_index_reports_no_matches_without_completing() {
        let dir = tempdir().unwrap();
        let config = PipelineConfig::new(
            dir.path().join("docs"),
            dir.path().join("state"),
            "char-ngram-128",
        );
        let embedder = CharacterNgramEmbedder::default();
        let index = LocalVectorIndex::open(config.index_path(), &embedder.id(), 128).unwrap();

        let engine = QueryEngine::new(Retriever::new(&embedder, &index, &config), &FailingCompletion);
        let mut memory = SessionMemory::new();
        let outcome = engine.answer("anything", &mut memory).await.unwrap();
        assert!(matches!(outcome, AnswerOutcome::NoMatches));
    }

    #[test]
    fn invalid_endpoint_is_rejected() {
        let result = HttpCompletionService::new("not a url", "model", None);
        assert!(matches!(result, Err(QueryError::Url(_))));
    }
}
