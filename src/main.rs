//! # Maritime Agent CLI (`maritime-agent`)
//!
//! ## Usage
//!
//! ```bash
//! maritime-agent --config ./config/agent.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `init` | Create the SQLite database and run schema migrations |
//! | `ingest` | Chunk, embed and store the knowledge directory |
//! | `retrieve <type> <sensor> <vessel>` | Show the documentation an event would be grounded with |
//! | `analyze <event_id>` | Run the agent for one event and store the result |
//! | `analyses` | List the most recent analyses |
//! | `serve` | Bootstrap the knowledge base and start the HTTP API |
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use maritime_agent::analyze::{AnalyzeRequest, Analyzer};
use maritime_agent::config::{self, Config};
use maritime_agent::embedding::OllamaEmbedder;
use maritime_agent::events;
use maritime_agent::ingest::Ingestor;
use maritime_agent::retrieve::{format_context_for_prompt, ContextRetriever};
use maritime_agent::store::SqliteStore;
use maritime_agent::{db, migrate, server};

/// Maritime telemetry analysis agent.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/agent.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "maritime-agent",
    about = "Tool-calling analysis agent for maritime telemetry events",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/agent.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Ingest the knowledge directory into the vector store.
    Ingest {
        /// Skip ingestion when the store already holds any rows.
        #[arg(long)]
        if_empty: bool,

        /// Override `knowledge.dir` from the config.
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Print the documentation retrieved for an event's fields.
    Retrieve {
        event_type: String,
        sensor_name: String,
        vessel_id: String,
    },

    /// Analyze one event and store the result.
    Analyze {
        event_id: i64,

        /// Re-run even when a completed analysis exists.
        #[arg(long)]
        force: bool,
    },

    /// List the most recent analyses.
    Analyses {
        #[arg(long, default_value = "10")]
        limit: i64,
    },

    /// Start the HTTP API.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    let pool = db::connect(&cfg).await?;
    migrate::run_migrations(&pool).await?;

    match cli.command {
        Commands::Init => {
            println!("Database initialized at {}", cfg.db.path.display());
        }
        Commands::Ingest { if_empty, dir } => {
            let dir = dir.unwrap_or_else(|| cfg.knowledge.dir.clone());
            let ingestor = build_ingestor(&cfg, pool)?;
            let written = if if_empty {
                ingestor.ingest_if_empty(&dir).await?
            } else {
                ingestor.ingest(&dir).await?
            };
            println!("Ingested {} chunks from {}", written, dir.display());
        }
        Commands::Retrieve {
            event_type,
            sensor_name,
            vessel_id,
        } => {
            let embedder = Arc::new(OllamaEmbedder::new(&cfg.embedding)?);
            let store = Arc::new(SqliteStore::new(pool, cfg.embedding.dims));
            let retriever = ContextRetriever::new(&cfg.retrieval, embedder, store);
            let documents = retriever
                .retrieve_context(&event_type, &sensor_name, &vessel_id)
                .await;
            match documents.as_deref() {
                None => println!("Retrieval failed; the analysis would run without documentation."),
                docs => println!("{}", format_context_for_prompt(docs)),
            }
        }
        Commands::Analyze { event_id, force } => {
            let analyzer = Analyzer::from_config(&cfg, pool)?;
            let record = analyzer
                .analyze(AnalyzeRequest { event_id, force })
                .await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Commands::Analyses { limit } => {
            let rows = events::recent_analyses(&pool, limit).await?;
            if rows.is_empty() {
                println!("No analyses yet.");
            }
            for row in rows {
                println!(
                    "#{} event {} [{}] {} {}/{} confidence {:.2} ({})",
                    row.id,
                    row.event_id,
                    row.status.as_str(),
                    row.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    row.vessel_id,
                    row.event_type,
                    row.confidence,
                    row.model_used
                );
                for action in &row.suggested_actions {
                    println!("    - {}", action);
                }
            }
        }
        Commands::Serve => {
            server::run_server(&cfg, pool)
                .await
                .context("HTTP server stopped")?;
        }
    }

    Ok(())
}

fn build_ingestor(cfg: &Config, pool: sqlx::SqlitePool) -> anyhow::Result<Ingestor> {
    let embedder = Arc::new(OllamaEmbedder::new(&cfg.embedding)?);
    let store = Arc::new(SqliteStore::new(pool, cfg.embedding.dims));
    Ingestor::new(cfg, embedder, store)
}
