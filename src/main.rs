//! # docchat CLI
//!
//! The `docchat` binary drives the document-chat service: database and
//! collection initialization, document ingestion, one-off questions, and
//! the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! docchat --config ./config/docchat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docchat init` | Create the session database and vector collection |
//! | `docchat ingest <files...>` | Extract, chunk, embed, and index documents |
//! | `docchat ask "<question>"` | Ask one question, streaming the answer |
//! | `docchat serve` | Start the HTTP server (upload + SSE chat) |

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

use docchat::agent::Agent;
use docchat::chat::ChatService;
use docchat::config::{self, Config};
use docchat::db;
use docchat::embedding::{Embedder, EmbeddingClient};
use docchat::index::Indexer;
use docchat::ingest::IngestPipeline;
use docchat::model::OpenAiChatModel;
use docchat::retrieve::Retriever;
use docchat::server;
use docchat::session::SqliteSessionStore;
use docchat::tool::ToolRegistry;
use docchat::vector_store::{create_store, VectorStore};

/// docchat CLI — retrieval-augmented chat over your documents.
#[derive(Parser)]
#[command(
    name = "docchat",
    about = "docchat — retrieval-augmented chat over your documents",
    version,
    long_about = "docchat ingests PDF, DOCX, and text documents into a vector store and \
    answers questions about them through a tool-using agent with streamed responses and \
    persistent chat sessions."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docchat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the session database and vector collection.
    ///
    /// Creates the SQLite session database and, when an embedding
    /// provider is configured, the vector store collection sized for its
    /// dimensionality. Idempotent.
    Init,

    /// Ingest documents into the vector store.
    ///
    /// Extracts text from each file (PDF, DOCX, or plain text), splits
    /// it into overlapping chunks, embeds them, and indexes the batch.
    Ingest {
        /// Files to ingest.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Show extraction and chunk counts without writing to the store.
        #[arg(long)]
        dry_run: bool,
    },

    /// Ask a single question and stream the answer to stdout.
    Ask {
        /// The question to ask.
        query: String,

        /// Session id to continue an existing conversation.
        #[arg(long)]
        session: Option<String>,
    },

    /// Start the HTTP server.
    ///
    /// Serves `POST /upload` for document ingestion and `GET /chat` for
    /// server-sent-events chat streams on the configured bind address.
    Serve,
}

/// Everything a running command needs, wired once from config.
struct Services {
    chat: Arc<ChatService>,
    ingest: Arc<IngestPipeline>,
}

async fn build_services(cfg: &Config) -> Result<Services> {
    let embedder: Arc<dyn Embedder> = Arc::new(EmbeddingClient::new(&cfg.embedding)?);
    let store = create_store(&cfg.vector_store)?;

    let indexer = Indexer::new(embedder.clone(), store.clone());
    let ingest = IngestPipeline::new(
        indexer,
        cfg.chunking.clone(),
        cfg.extraction.unknown_files,
    );

    let retriever = Retriever::new(embedder, store, cfg.retrieval.top_k);
    let mut tools = ToolRegistry::new();
    tools.register(Arc::new(retriever));

    let model = Arc::new(OpenAiChatModel::new(&cfg.model)?);
    let agent = Agent::new(model, tools, cfg.agent.max_iterations);

    let sessions = Arc::new(SqliteSessionStore::connect(&cfg.sessions.db_path).await);
    let chat = Arc::new(ChatService::new(agent, sessions));

    Ok(Services {
        chat,
        ingest: Arc::new(ingest),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docchat=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg.sessions.db_path).await?;
            db::run_migrations(&pool).await?;
            println!("Session database initialized at {}", cfg.sessions.db_path.display());

            if cfg.embedding.is_enabled() {
                let embedder = EmbeddingClient::new(&cfg.embedding)?;
                let store = create_store(&cfg.vector_store)?;
                store.ensure_collection(embedder.dims()).await?;
                println!(
                    "Vector collection '{}' ready ({} dims).",
                    cfg.vector_store.collection,
                    embedder.dims()
                );
            } else {
                println!("Embedding provider disabled; skipping vector collection setup.");
            }
        }
        Commands::Ingest { files, dry_run } => {
            if dry_run {
                run_ingest_dry_run(&cfg, &files)?;
                return Ok(());
            }
            let services = build_services(&cfg).await?;
            let report = services.ingest.ingest_files(&files).await?;
            println!(
                "Ingested {} of {} file(s): {} chunks indexed.",
                report.files_extracted, report.files_seen, report.chunks_indexed
            );
        }
        Commands::Ask { query, session } => {
            let services = build_services(&cfg).await?;
            let session_id = session.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

            let (tx, mut rx) = mpsc::channel::<String>(64);
            let chat = services.chat.clone();
            let turn_session = session_id.clone();
            let turn = tokio::spawn(async move {
                chat.run_turn(&turn_session, &query, &tx).await;
            });

            let mut stdout = std::io::stdout();
            while let Some(delta) = rx.recv().await {
                write!(stdout, "{}", delta)?;
                stdout.flush()?;
            }
            writeln!(stdout)?;
            turn.await?;

            eprintln!("(session: {})", session_id);
        }
        Commands::Serve => {
            let services = build_services(&cfg).await?;
            server::run_server(&cfg, services.chat, services.ingest).await?;
        }
    }

    Ok(())
}

/// Extraction and chunking only, no embedding or store access.
fn run_ingest_dry_run(cfg: &Config, files: &[PathBuf]) -> Result<()> {
    let mut documents = Vec::new();
    for path in files {
        if let Some(doc) = docchat::extract::extract_file(path, cfg.extraction.unknown_files) {
            documents.push(doc);
        }
    }
    let chunks = docchat::chunk::split_documents(
        &documents,
        cfg.chunking.max_chars,
        cfg.chunking.overlap_chars,
    );
    println!(
        "Would index {} chunk(s) from {} of {} file(s).",
        chunks.len(),
        documents.len(),
        files.len()
    );
    Ok(())
}
