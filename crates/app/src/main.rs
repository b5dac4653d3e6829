use chrono::Utc;
use clap::{Parser, Subcommand};
use doc_assist_core::{
    embedder_for_model, rebuild, run_ingestion, AnswerOutcome, Embedder, HttpCompletionService,
    LocalVectorIndex, Manifest, PipelineConfig, QueryEngine, Retriever, RetrievalOutcome,
    SessionMemory,
};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "doc-assist", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Folder scanned recursively for documents.
    #[arg(long, default_value = "./documents")]
    corpus: PathBuf,

    /// Directory holding the manifest and index files.
    #[arg(long, default_value = "./state")]
    state_dir: PathBuf,

    /// Embedding model identifier.
    #[arg(long, default_value = "char-ngram-128")]
    embedding_model: String,

    /// Maximum chunk size in characters.
    #[arg(long, default_value = "1000")]
    chunk_size: usize,

    /// Characters of overlap carried between consecutive chunks.
    #[arg(long, default_value = "150")]
    chunk_overlap: usize,
}

#[derive(Subcommand)]
enum Command {
    /// Synchronize the index with the corpus folder.
    Ingest {
        /// Discard the manifest and index before ingesting.
        #[arg(long, default_value_t = false)]
        rebuild: bool,
    },
    /// Retrieve the chunks most similar to a query.
    Search {
        /// Search query
        #[arg(long)]
        query: String,
        /// Number of chunks to return.
        #[arg(long, default_value = "8")]
        top_k: usize,
        /// Minimum similarity a chunk must reach to count as relevant.
        #[arg(long)]
        threshold: Option<f32>,
    },
    /// Answer a question from the indexed documents via a completion service.
    Ask {
        /// Question to answer
        #[arg(long)]
        question: String,
        /// Number of chunks retrieved as context.
        #[arg(long, default_value = "8")]
        top_k: usize,
        /// Minimum similarity a chunk must reach to count as relevant.
        #[arg(long, default_value = "0.25")]
        threshold: f32,
        /// Completion service endpoint.
        #[arg(long, default_value = "http://localhost:8080/v1/complete")]
        completion_url: String,
        /// Completion model name.
        #[arg(long, default_value = "llama-3.1-8b-instant")]
        completion_model: String,
        /// Bearer token for the completion service.
        #[arg(long, env = "COMPLETION_API_KEY")]
        api_key: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = PipelineConfig::new(&cli.corpus, &cli.state_dir, &cli.embedding_model);
    config.chunking.max_chars = cli.chunk_size;
    config.chunking.overlap_chars = cli.chunk_overlap;
    match &cli.command {
        Command::Search { top_k, threshold, .. } => {
            config.top_k = *top_k;
            config.relevance_threshold = *threshold;
        }
        Command::Ask {
            top_k, threshold, ..
        } => {
            config.top_k = *top_k;
            config.relevance_threshold = Some(*threshold);
        }
        Command::Ingest { .. } => {}
    }
    config
        .validate()
        .map_err(|error| anyhow::anyhow!(error.to_string()))?;

    let embedder =
        embedder_for_model(&cli.embedding_model).map_err(|error| anyhow::anyhow!(error.to_string()))?;
    let index = LocalVectorIndex::open(config.index_path(), &embedder.id(), embedder.dimensions())
        .map_err(|error| anyhow::anyhow!(error.to_string()))?;
    let mut manifest = Manifest::load(config.manifest_path());

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "doc-assist boot"
    );

    match cli.command {
        Command::Ingest { rebuild: wipe } => {
            if wipe {
                warn!("discarding manifest and index before ingesting");
                rebuild(&index, &mut manifest)
                    .await
                    .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            }

            let report = run_ingestion(&config, &embedder, &index, &mut manifest)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            for skipped in &report.skipped {
                warn!(path = %skipped.path, reason = %skipped.reason, "skipped document");
            }

            info!(
                processed = report.processed.len(),
                removed = report.removed.len(),
                unchanged = report.unchanged,
                skipped = report.skipped.len(),
                chunks_indexed = report.chunks_indexed,
                "ingestion pass complete"
            );
            println!(
                "{} documents processed, {} removed, {} unchanged, {} skipped, {} chunks indexed",
                report.processed.len(),
                report.removed.len(),
                report.unchanged,
                report.skipped.len(),
                report.chunks_indexed
            );
        }
        Command::Search { query, .. } => {
            let retriever = Retriever::new(&embedder, &index, &config);
            match retriever
                .retrieve(&query)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?
            {
                RetrievalOutcome::Relevant(hits) => {
                    for hit in hits {
                        println!(
                            "score={:.4} source={} format={} position={}",
                            hit.score,
                            hit.metadata.source_path,
                            hit.metadata.format.as_str(),
                            hit.metadata.position.label()
                        );
                        println!("  {}", hit.text);
                    }
                }
                RetrievalOutcome::Filtered {
                    candidates,
                    best_score,
                } => {
                    println!(
                        "{candidates} candidate(s) found, best score {best_score:.4}, none above the threshold"
                    );
                }
                RetrievalOutcome::NoMatches => {
                    println!("no matches in the index");
                }
            }
        }
        Command::Ask {
            question,
            completion_url,
            completion_model,
            api_key,
            ..
        } => {
            let completion =
                HttpCompletionService::new(&completion_url, completion_model, api_key)
                    .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            let engine = QueryEngine::new(Retriever::new(&embedder, &index, &config), &completion);
            let mut memory = SessionMemory::new();

            match engine
                .answer(&question, &mut memory)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?
            {
                AnswerOutcome::Answered { text, sources } => {
                    println!("{text}");
                    println!();
                    for (path, score) in sources {
                        println!("source: {path} (score {score:.4})");
                    }
                }
                AnswerOutcome::NoRelevantContext {
                    candidates,
                    best_score,
                } => {
                    println!(
                        "No related information is present in the documents \
                         ({candidates} candidate(s), best score {best_score:.4})."
                    );
                }
                AnswerOutcome::NoMatches => {
                    println!("No related information is present in the documents.");
                }
            }
        }
    }

    Ok(())
}
