//! # Textbook Tutor CLI (`tutor`)
//!
//! The `tutor` binary wraps the query pipeline for local use: database
//! initialization, one-off queries from the terminal, and the HTTP
//! server the web client talks to.
//!
//! ## Usage
//!
//! ```bash
//! tutor --config ./config/tutor.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `tutor init` | Create the SQLite database schema |
//! | `tutor query "<question>" --document <id> --user <id>` | Run one query and print the answer |
//! | `tutor serve` | Start the HTTP API server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use textbook_tutor::models::QueryRequest;
use textbook_tutor::query::QueryOrchestrator;
use textbook_tutor::{config, db, migrate, server};

/// Textbook Tutor — retrieval-augmented question answering for uploaded
/// textbooks.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/tutor.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "tutor",
    about = "Textbook Tutor — retrieval-augmented question answering for uploaded textbooks",
    version,
    long_about = "Textbook Tutor answers student questions about an uploaded textbook by \
    retrieving the most similar stored passages and asking a completion service for a grounded \
    answer with page citations."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/tutor.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the `documents` and
    /// `passages` tables. Idempotent: running it multiple times is safe.
    Init,

    /// Ask one question against a document and print the answer.
    ///
    /// Runs the full pipeline (embed, search, generate, filter) exactly
    /// as the HTTP API does. Requires `OPENAI_API_KEY` in the environment.
    Query {
        /// The question to ask.
        question: String,

        /// Identifier of the document to query.
        #[arg(long)]
        document: i64,

        /// Identifier of the requesting user; must own the document.
        #[arg(long)]
        user: i64,

        /// How many passages to retrieve (defaults to the configured
        /// `retrieval.default_top_k`).
        #[arg(long)]
        top_k: Option<i64>,
    },

    /// Start the HTTP API server.
    ///
    /// Binds to the address configured in `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg.db).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Query {
            question,
            document,
            user,
            top_k,
        } => {
            let pool = db::connect(&cfg.db).await?;
            let orchestrator = Arc::new(QueryOrchestrator::from_config(&cfg, pool)?);

            let req = QueryRequest {
                question,
                document_id: document,
                top_k,
            };

            match orchestrator.query(&req, user).await {
                Ok(response) => {
                    println!("{}", response.answer);
                    println!();
                    println!(
                        "--- Sources ({}) — {:.2}ms ---",
                        response.sources.len(),
                        response.time_taken_ms
                    );
                    for source in &response.sources {
                        println!(
                            "page {:>4}  [{:.2}]  {}",
                            source.page_number,
                            source.similarity,
                            source.content.replace('\n', " ")
                        );
                    }
                }
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
