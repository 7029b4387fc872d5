//! # `codevec-index`
//!
//! Index a directory of source and documentation files into pgvector.
//!
//! ```bash
//! codevec-index ./my-project                 # namespace "code_index"
//! codevec-index ./docs docs --cleanup source
//! codevec-index ./my-project --force-update
//! ```
//!
//! Unchanged chunks are skipped; chunks from files that disappeared since the
//! last run are deleted. Exits with status 1 when the directory is missing.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use codevec::cli;
use codevec::config::{load_config, CleanupMode};
use codevec::ingest::{self, DEFAULT_NAMESPACE};

#[derive(Parser)]
#[command(
    name = "codevec-index",
    version,
    about = "Incrementally index a directory into a pgvector table"
)]
struct Args {
    /// Directory to index (searched recursively).
    #[arg(value_parser = cli::existing_dir)]
    directory: PathBuf,

    /// Logical partition for this document set.
    #[arg(default_value = DEFAULT_NAMESPACE, value_parser = cli::non_empty)]
    namespace: String,

    /// Path to a TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Which untouched entries to delete after indexing.
    #[arg(long, value_enum)]
    cleanup: Option<CleanupMode>,

    /// Re-embed chunks even when they are already indexed.
    #[arg(long)]
    force_update: bool,

    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Args = cli::parse_or_exit();
    cli::init_logging(args.verbose);

    let mut config = load_config(args.config.as_deref())?;
    if let Some(cleanup) = args.cleanup {
        config.index.cleanup = cleanup;
    }
    if args.force_update {
        config.index.force_update = true;
    }

    ingest::run_index(&config, &args.directory, &args.namespace).await?;
    Ok(())
}
