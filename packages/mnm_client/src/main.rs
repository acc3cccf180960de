use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::prelude::*;

use mnm_client::config::MnmConfig;

mod cli;

#[derive(Parser)]
#[command(name = "mnm")]
#[command(about = "Push channel and fetch client for an mnm service")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Custom data directory (defaults to ~/.mnm)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a session and print render updates as JSON lines
    Connect(ConnectArgs),

    /// Decode a packed record stream from a file
    Decode(DecodeArgs),
}

#[derive(Parser)]
pub(crate) struct ConnectArgs {
    /// Server host (overrides config)
    #[arg(long)]
    pub host: Option<String>,

    /// Server port (overrides config)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Service name (overrides config)
    #[arg(short, long)]
    pub service: Option<String>,

    /// Subscribe to this service's notices after connecting
    #[arg(long)]
    pub notices: Option<String>,
}

#[derive(Parser)]
pub(crate) struct DecodeArgs {
    /// File holding the response body
    pub file: PathBuf,

    /// Decode exactly one record (`mn` response) instead of a mapping
    #[arg(long)]
    pub single: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_directive = if cli.debug {
        "mnm=debug,mnm_client=debug,info"
    } else {
        "mnm=info,mnm_client=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();

    match cli.command {
        Commands::Connect(args) => {
            let config = MnmConfig::new(cli.data_dir)?;
            cli::connect_command(&config, args).await
        }
        Commands::Decode(args) => cli::decode_command(&args),
    }
}
