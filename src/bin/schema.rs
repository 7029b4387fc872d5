//! # `codevec-schema`
//!
//! Drop and recreate the record and vector tables. All indexed data is lost.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use codevec::cli;
use codevec::config::load_config;
use codevec::schema;

#[derive(Parser)]
#[command(
    name = "codevec-schema",
    version,
    about = "Drop and recreate the codevec tables (destructive)"
)]
struct Args {
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
    schema::run_recreate(&config).await
}
