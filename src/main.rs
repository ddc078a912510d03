//! # Knowledge Harness CLI (`kb`)
//!
//! ## Usage
//!
//! ```bash
//! kb --config ./config/kb.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `kb init` | Create the SQLite database and run schema migrations |
//! | `kb sources` | List configured sources and their health |
//! | `kb ingest` | Ingest every source into a new snapshot |
//! | `kb search "<query>"` | Ranked search over the current snapshot |
//! | `kb get <id>` | Show one entity with its related entities |
//! | `kb jobs [<id>]` | Ingestion job history or one job's detail |
//! | `kb stats` | Snapshot statistics |
//! | `kb export` | Write the snapshot as JSON |
//! | `kb serve` | Start the HTTP server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use knowledge_harness::progress::ProgressMode;
use knowledge_harness::{
    config, export, get, ingest, jobs, migrate, search, server, sources, stats,
};
use knowledge_harness_core::models::{AccessLevel, KnowledgeType};
use knowledge_harness_core::search::{SearchFilters, SearchRequest};

/// Knowledge Harness CLI: ingest structured knowledge and search it.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/kb.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "kb",
    about = "Knowledge Harness — knowledge ingestion and ranked retrieval",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/kb.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// List configured sources and whether their paths are readable.
    Sources,

    /// Ingest every configured source into a new snapshot.
    ///
    /// Bad records and entities whose embedding fails are skipped and
    /// reported; the previous snapshot stays current if the job fails.
    Ingest {
        /// Progress output on stderr: off, human, or json.
        /// Defaults to human on a TTY, otherwise off.
        #[arg(long)]
        progress: Option<ProgressMode>,
    },

    /// Search the current snapshot.
    Search {
        query: String,

        /// Only entities of this type (repeatable).
        #[arg(long = "type", value_name = "TYPE")]
        types: Vec<KnowledgeType>,

        /// Only entities carrying this tag (repeatable).
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Only entities with this access level (repeatable).
        #[arg(long = "access")]
        access_levels: Vec<AccessLevel>,

        /// Only entities associated with this project (repeatable).
        #[arg(long = "project")]
        projects: Vec<String>,

        /// Maximum number of results (default: retrieval.top_k).
        #[arg(long, value_parser = jobs::parse_limit)]
        limit: Option<usize>,

        /// Show the per-signal score breakdown.
        #[arg(long)]
        explain: bool,
    },

    /// Show one entity by id (e.g. `project_airdropops`).
    Get { id: String },

    /// List recent ingestion jobs, or show one job.
    Jobs {
        id: Option<String>,

        #[arg(long, default_value = "20", value_parser = jobs::parse_limit)]
        limit: usize,
    },

    /// Show snapshot statistics.
    Stats,

    /// Export the current snapshot as JSON.
    Export {
        /// Output file path. Writes to stdout if omitted.
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Include embedding vectors.
        #[arg(long)]
        with_embeddings: bool,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("knowledge_harness=info,knowledge_harness_core=info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sources => {
            sources::list_sources(&cfg)?;
        }
        Commands::Ingest { progress } => {
            let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
            ingest::run_ingest(&cfg, mode).await?;
        }
        Commands::Search {
            query,
            types,
            tags,
            access_levels,
            projects,
            limit,
            explain,
        } => {
            let request = SearchRequest {
                query,
                filters: SearchFilters {
                    types,
                    tags,
                    access_levels,
                    project_associations: projects,
                },
                limit,
                explain,
            };
            search::run_search(&cfg, &request).await?;
        }
        Commands::Get { id } => {
            get::run_get(&cfg, &id).await?;
        }
        Commands::Jobs { id, limit } => {
            jobs::run_jobs(&cfg, id.as_deref(), limit).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Export {
            output,
            with_embeddings,
        } => {
            export::run_export(&cfg, output.as_deref(), with_embeddings).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
