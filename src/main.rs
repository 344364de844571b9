//! # Vault Linker CLI (`vlink`)
//!
//! ## Usage
//!
//! ```bash
//! vlink --config ./config/vlink.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `vlink annotate` | Splice scored links and tags into every note |
//! | `vlink fingerprint` | Refresh the fingerprint ledger read by the scorer |
//! | `vlink boundary` | Add boundary markers to notes lacking one |
//! | `vlink ids` | Replace missing or placeholder identifiers |
//! | `vlink clean` | Remove every machine-owned section |
//!
//! ## Examples
//!
//! ```bash
//! # Make every note trackable, then give each a stable id
//! vlink boundary
//! vlink ids
//!
//! # Record fingerprints so the scorer knows what changed
//! vlink fingerprint
//!
//! # After scoring: annotate two folders only, without touching the ledger
//! vlink annotate --scoring skip --folders Projects --folders Journal
//!
//! # Preview what clean would do
//! vlink clean --dry-run
//!
//! # Wipe the whole annotation zone, user text after the marker included
//! vlink clean --all-after-boundary
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use vault_linker::batch::{RunOptions, Scope};
use vault_linker::config;
use vault_linker::models::ScoringMode;
use vault_linker::progress::ProgressMode;
use vault_linker::store::fs::FsStore;
use vault_linker::{annotate, hash_cmd, ids_cmd};

/// Vault Linker: idempotent, change-aware annotation of Markdown notes.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/vlink.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "vlink",
    about = "Vault Linker: keep suggested links, tags and ids in Markdown notes up to date",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/vlink.toml")]
    config: PathBuf,

    /// Progress on stderr: off, human, or json. Defaults to human on a TTY.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    /// Log more (-v info, -vv debug). `RUST_LOG` overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every batch command.
#[derive(Args, Clone, Debug)]
struct ScopeArgs {
    /// Restrict the run to these folders (repeatable). Default: whole vault.
    #[arg(long = "folders", num_args = 1..)]
    folders: Vec<String>,

    /// Compute and report, never write.
    #[arg(long)]
    dry_run: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Insert scored links and tags after each note's boundary marker.
    ///
    /// Aborts before touching any note if the scoring data is missing.
    Annotate {
        #[command(flatten)]
        scope: ScopeArgs,

        /// How to update the fingerprint ledger: force marks every note
        /// for re-scoring, smart records new and changed notes, skip
        /// leaves the ledger alone.
        #[arg(long, value_enum, default_value = "smart")]
        scoring: ScoringMode,
    },

    /// Recompute tracked-body fingerprints and update the ledger.
    Fingerprint {
        #[command(flatten)]
        scope: ScopeArgs,

        /// Rewrite every entry and flag the ledger for a full re-score.
        #[arg(long)]
        force: bool,
    },

    /// Add a boundary marker to notes that lack one.
    Boundary {
        #[command(flatten)]
        scope: ScopeArgs,
    },

    /// Ensure every note has a genuine identifier in its frontmatter.
    Ids {
        #[command(flatten)]
        scope: ScopeArgs,
    },

    /// Remove every machine-owned section, keeping user text.
    Clean {
        #[command(flatten)]
        scope: ScopeArgs,

        /// Drop everything after the boundary marker, user text included.
        #[arg(long)]
        all_after_boundary: bool,
    },
}

impl Commands {
    fn scope(&self) -> &ScopeArgs {
        match self {
            Commands::Annotate { scope, .. }
            | Commands::Fingerprint { scope, .. }
            | Commands::Boundary { scope }
            | Commands::Ids { scope }
            | Commands::Clean { scope, .. } => scope,
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = config::load_config(&cli.config)?;
    let store = FsStore::new(&cfg.vault)?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("Interrupted: finishing the current batch...");
                cancel.cancel();
            }
        });
    }

    let scope_args = cli.command.scope();
    let opts = RunOptions {
        scope: Scope::folders(&scope_args.folders),
        dry_run: scope_args.dry_run,
        progress: cli.progress.unwrap_or_else(ProgressMode::default_for_tty),
        cancel,
    };
    if opts.dry_run {
        println!("Dry run: no files will be written.");
    }

    match cli.command {
        Commands::Annotate { scoring, .. } => {
            let summary = annotate::run_annotate(&cfg, &store, &opts, scoring).await?;
            println!("{}", summary);
        }
        Commands::Fingerprint { force, .. } => {
            let summary = hash_cmd::run_fingerprint(&cfg, &store, &opts, force).await?;
            println!("{}", summary);
        }
        Commands::Boundary { .. } => {
            let report = hash_cmd::run_add_boundaries(&cfg, &store, &opts).await?;
            println!("{}", report);
        }
        Commands::Ids { .. } => {
            let summary = ids_cmd::run_ids(&cfg, &store, &opts).await?;
            println!("{}", summary);
        }
        Commands::Clean {
            all_after_boundary, ..
        } => {
            let report = annotate::run_clean(&cfg, &store, &opts, all_after_boundary).await?;
            println!("{}", report);
        }
    }

    Ok(())
}
