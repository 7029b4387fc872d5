//! # `codevec-query`
//!
//! Print the chunks nearest to a free-text query.
//!
//! ```bash
//! codevec-query "database connection pool"        # top 3
//! codevec-query "render results" 5 --source src/ui.tsx
//! codevec-query "install" --json
//! ```

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use codevec::cli;
use codevec::config::load_config;
use codevec::search::{self, DEFAULT_TOP_K};

#[derive(Parser)]
#[command(
    name = "codevec-query",
    version,
    about = "Similarity search over indexed chunks"
)]
struct Args {
    /// Free-text query.
    #[arg(value_parser = cli::non_empty)]
    query: String,

    /// Number of results.
    #[arg(default_value_t = DEFAULT_TOP_K, value_parser = cli::positive)]
    top_k: usize,

    /// Only return chunks from this source path.
    #[arg(long)]
    source: Option<String>,

    /// Print hits as JSON.
    #[arg(long)]
    json: bool,

    /// Path to a TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Args = cli::parse_or_exit();
    cli::init_logging(args.verbose);

    let config = load_config(args.config.as_deref())?;
    search::run_search(
        &config,
        &args.query,
        args.top_k,
        args.source.as_deref(),
        args.json,
    )
    .await
}
