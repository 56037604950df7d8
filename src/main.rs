//! # Lore CLI (`lore`)
//!
//! Command-line front end for the knowledge index: add and remove packs,
//! toggle their visibility, and ask questions scoped to a game profile.
//!
//! ## Usage
//!
//! ```bash
//! lore --config ~/.config/lore/config.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lore add <pack.json>` | Ingest and index a pack (re-indexes an existing id) |
//! | `lore note <profile> <text>` | Index a one-off note as its own pack |
//! | `lore remove <pack>` | Drop a pack's chunks and refit |
//! | `lore enable <pack>` / `lore disable <pack>` | Show or hide a pack in results |
//! | `lore query <profile> "<question>"` | Retrieve the best-matching chunks |
//! | `lore packs` | List indexed packs |
//! | `lore stats` | Index size by profile |
//! | `lore completions <shell>` | Print a shell completion script |
//!
//! ## Examples
//!
//! ```bash
//! lore add ./packs/elden-ring-bosses.json
//! lore query elden_ring "how do I beat malenia" --top-k 3
//! lore disable elden-ring-bosses
//! ```

use std::io;
use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tracing_subscriber::EnvFilter;

use lore_index::config::{self, Config};
use lore_index::{commands, KnowledgeIndex};

/// Lore: a local-first knowledge index for grounding game-assistant answers.
///
/// Packs of notes, files, and web pages are chunked, weighted with TF-IDF,
/// and searched per game profile.
#[derive(Parser)]
#[command(name = "lore", version)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `<config dir>/lore/config.toml`; built-in defaults are
    /// used when that file does not exist.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest and index a pack described by a JSON file.
    ///
    /// Sources that fail to ingest are reported; the rest of the pack is
    /// indexed. Adding a pack id that is already indexed replaces it.
    Add {
        /// Path to the pack JSON.
        pack: PathBuf,
    },

    /// Index a single note as a new pack.
    Note {
        /// Game profile the note belongs to.
        profile: String,

        /// Note text.
        content: String,

        /// Optional title shown in listings.
        #[arg(long)]
        title: Option<String>,
    },

    /// Remove a pack and all of its chunks.
    Remove {
        /// Pack id.
        pack: String,
    },

    /// Include a disabled pack in query results again.
    Enable {
        /// Pack id.
        pack: String,
    },

    /// Hide a pack from query results without removing it.
    Disable {
        /// Pack id.
        pack: String,
    },

    /// Retrieve the chunks most relevant to a question.
    Query {
        /// Game profile to search.
        profile: String,

        /// The question.
        question: String,

        /// Maximum number of results (overrides `retrieval.top_k`).
        #[arg(long)]
        top_k: Option<usize>,

        /// Drop results scoring below this value (overrides `retrieval.min_score`).
        #[arg(long)]
        min_score: Option<f32>,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List indexed packs.
    Packs {
        /// Print pack records as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show index statistics.
    Stats,

    /// Print a shell completion script to stdout.
    Completions {
        shell: Shell,
    },
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn load(cli_config: Option<&PathBuf>) -> Result<Config> {
    match cli_config {
        // An explicit path must exist.
        Some(path) => config::load_config(path),
        None => config::load_or_default(&config::default_config_path()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "lore", &mut io::stdout());
        return Ok(());
    }

    let cfg = load(cli.config.as_ref())?;
    init_logging(&cfg.logging.level);
    let index = KnowledgeIndex::open(&cfg)?;

    match cli.command {
        Commands::Add { pack } => {
            commands::run_add(&index, &pack).await?;
        }
        Commands::Note {
            profile,
            content,
            title,
        } => {
            commands::run_note(&index, &profile, title, &content).await?;
        }
        Commands::Remove { pack } => {
            commands::run_remove(&index, &pack).await?;
        }
        Commands::Enable { pack } => {
            commands::run_set_enabled(&index, &pack, true).await?;
        }
        Commands::Disable { pack } => {
            commands::run_set_enabled(&index, &pack, false).await?;
        }
        Commands::Query {
            profile,
            question,
            top_k,
            min_score,
            json,
        } => {
            commands::run_query(&index, &cfg, &profile, &question, top_k, min_score, json)?;
        }
        Commands::Packs { json } => {
            commands::run_packs(&index, json)?;
        }
        Commands::Stats => {
            commands::run_stats(&index)?;
        }
        Commands::Completions { .. } => unreachable!("handled before config load"),
    }

    Ok(())
}
