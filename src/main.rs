//! # Context Select CLI (`ctxsel`)
//!
//! ```bash
//! ctxsel --config ./config/ctxsel.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ctxsel init` | Create the SQLite database and schema |
//! | `ctxsel import <file>` | Load pre-chunked documents from JSON |
//! | `ctxsel retrieve "<query>"` | Budget-gated retrieval |
//! | `ctxsel select "<query>"` | Two-stage selection |
//! | `ctxsel search "<query>"` | Hybrid search, optionally with selection |
//! | `ctxsel decide` | Show the retrieval-mode decision for a budget |

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use context_select::retrieve::{self, DecideArgs, QueryArgs};
use context_select::{config, import, logging, migrate};

/// Budget-aware fragment retrieval and relevance selection.
#[derive(Parser)]
#[command(name = "ctxsel", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ctxsel.toml")]
    config: PathBuf,

    /// Log at debug level (overridden by `RUST_LOG`).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct QueryOpts {
    /// Identity whose documents are searched.
    #[arg(long, default_value = "default")]
    identity: String,

    /// Restrict to this document id. Repeatable.
    #[arg(long = "document")]
    documents: Vec<String>,

    /// Candidate pool size.
    #[arg(long)]
    pool: Option<usize>,

    /// Number of fragments to return. For `retrieve`, a fixed budget.
    #[arg(long)]
    count: Option<usize>,

    /// Print the full result, diagnostics included, as JSON.
    #[arg(long)]
    json: bool,
}

impl From<QueryOpts> for QueryArgs {
    fn from(o: QueryOpts) -> Self {
        QueryArgs {
            identity: o.identity,
            documents: o.documents,
            pool: o.pool,
            count: o.count,
            json: o.json,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Import pre-chunked documents from a JSON file.
    Import {
        /// Path to the JSON file.
        file: PathBuf,
    },

    /// Retrieve context for a question using the configured budget.
    Retrieve {
        query: String,
        #[command(flatten)]
        opts: QueryOpts,
    },

    /// Two-stage selection: fetch, summarize, select, re-fetch.
    Select {
        query: String,
        #[command(flatten)]
        opts: QueryOpts,
    },

    /// Hybrid search over vector and keyword scores.
    Search {
        query: String,
        #[command(flatten)]
        opts: QueryOpts,

        /// Return the top scored fragments without relevance selection.
        #[arg(long)]
        no_smart: bool,
    },

    /// Print the retrieval-mode decision for a budget and corpus size.
    Decide {
        /// fixed, percent, adaptive, or full_document.
        #[arg(long)]
        mode: String,
        #[arg(long)]
        percent: Option<f64>,
        /// Adaptive-mode percent cap.
        #[arg(long)]
        cap: Option<f64>,
        #[arg(long)]
        count: Option<usize>,
        /// Total fragments in the corpus.
        #[arg(long)]
        corpus: usize,
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    // `decide` is pure and needs no config.
    if let Commands::Decide {
        mode,
        percent,
        cap,
        count,
        corpus,
        json,
    } = &cli.command
    {
        return retrieve::run_decide(&DecideArgs {
            mode: mode.clone(),
            percent: *percent,
            cap: *cap,
            count: *count,
            corpus: *corpus,
            json: *json,
        });
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Import { file } => {
            import::run_import(&cfg, &file).await?;
        }
        Commands::Retrieve { query, opts } => {
            retrieve::run_retrieve(&cfg, &query, &opts.into()).await?;
        }
        Commands::Select { query, opts } => {
            retrieve::run_select(&cfg, &query, &opts.into()).await?;
        }
        Commands::Search {
            query,
            opts,
            no_smart,
        } => {
            retrieve::run_search(&cfg, &query, &opts.into(), no_smart).await?;
        }
        Commands::Decide { .. } => {}
    }

    Ok(())
}
