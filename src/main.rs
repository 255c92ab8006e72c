//! # LiveIndex CLI (`liveindex`)
//!
//! ## Usage
//!
//! ```bash
//! liveindex --config ./config/liveindex.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `liveindex serve` | Index the watch root, watch it, and serve HTTP + WebSocket |
//! | `liveindex ingest` | Index the watch root once and print a summary |
//! | `liveindex ask "<question>"` | Index once, then answer a question |
//!
//! Without `--config`, built-in defaults are used (watch root `./documents`,
//! offline `hash` embedder).

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

use liveindex::app::LiveIndex;
use liveindex::config::{load_config, Config};
use liveindex::logging::init_logging;
use liveindex::query::QueryRequest;
use liveindex::server::run_server;

/// Upper bound on waiting for the initial scan to finish indexing.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(600);

/// LiveIndex — a continuously synchronized, permission-aware document index.
#[derive(Parser)]
#[command(
    name = "liveindex",
    about = "LiveIndex — keeps a searchable index in sync with a document folder",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter (overridden by `RUST_LOG`).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP/WebSocket server.
    ///
    /// Runs an initial scan, starts the watcher (unless
    /// `watch.auto_start = false`), and serves until terminated.
    Serve,

    /// Index every document under the watch root once.
    Ingest,

    /// Index once, then answer a question.
    Ask {
        /// The question.
        query: String,

        /// Maximum number of sources.
        #[arg(long)]
        top_k: Option<usize>,

        /// Role name to query as (defaults to the least privileged role).
        #[arg(long)]
        role: Option<String>,

        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_json)?;

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Serve => {
            let auto_start = config.watch.auto_start;
            let app = LiveIndex::from_config(config)?;
            let report = app.ingest().await?;
            tracing::info!(documents = report.documents_found, "initial scan enqueued");
            if auto_start {
                app.start_watcher()?;
            }
            run_server(app).await?;
        }
        Commands::Ingest => {
            let app = LiveIndex::from_config(config)?;
            let report = app.ingest().await?;
            if !app.wait_idle(SETTLE_TIMEOUT).await {
                bail!("Timed out waiting for indexing to finish");
            }
            let status = app.status();
            let failed = status
                .documents
                .iter()
                .filter(|d| d.state == liveindex_core::models::SyncState::Failed)
                .count();
            println!("Ingest complete:");
            println!("  documents found:  {}", report.documents_found);
            println!("  documents indexed: {}", status.documents_indexed);
            println!("  chunks indexed:   {}", status.chunks_indexed);
            println!("  failed:           {}", failed);
        }
        Commands::Ask {
            query,
            top_k,
            role,
            json,
        } => {
            let app = LiveIndex::from_config(config)?;
            app.ingest().await?;
            if !app.wait_idle(SETTLE_TIMEOUT).await {
                bail!("Timed out waiting for indexing to finish");
            }

            let role = app.resolve_role(role.as_deref(), None)?;
            let request = QueryRequest {
                text: query,
                top_k,
                role,
                document_id: None,
            };
            let result = app.query(request).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("{}", result.answer);
                if !result.sources.is_empty() {
                    println!();
                    println!("Sources:");
                    for (i, source) in result.sources.iter().enumerate() {
                        println!(
                            "  {}. {} (offset {}, score {:.4})",
                            i + 1,
                            source.document_id,
                            source.offset,
                            source.score
                        );
                    }
                }
                println!();
                println!("({:.1} ms)", result.latency_ms);
            }
        }
    }

    Ok(())
}
