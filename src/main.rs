use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use changewatch::{cli, Commands, Config};

const DEFAULT_LOG_FILTER: &str = "changewatch=info";

/// Record and notify changes in a local folder and a remote drive folder.
#[derive(Parser, Debug)]
#[command(name = "changewatch", version, about)]
struct Cli {
    /// Config file (defaults to ~/.changewatch/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Cli::parse();
    let config = Config::load(args.config.as_deref())?;
    config.validate()?;

    cli::handle_command(args.command, config).await
}
