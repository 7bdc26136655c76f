use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use uptime_watcher::config::Config;
use uptime_watcher::orchestrator::{self, Orchestrator};

/// Polls HTTP endpoints and records availability samples
#[derive(Parser, Debug)]
#[command(name = "uptime-watcher", version, about)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Probe the endpoints owned by this partition until interrupted
    Run {
        /// Number of instances sharing the endpoint set
        #[arg(long)]
        partition_count: Option<i64>,
        /// Zero-based index of this instance
        #[arg(long)]
        partition_id: Option<i64>,
    },
    /// Create or upgrade the database schema and exit
    Prepare,
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    logger::init_tracing();

    let cli = Cli::parse();
    let mut config = Config::from_config(cli.config.as_ref())?.with_env_overrides();

    match cli.command {
        Command::Run { partition_count, partition_id } => {
            if let Some(count) = partition_count {
                config.partition.count = count;
            }
            if let Some(id) = partition_id {
                config.partition.id = id;
            }
            info!(version = env!("CARGO_PKG_VERSION"), "starting uptime-watcher");
            Orchestrator::start(config).await?;
        }
        Command::Prepare => orchestrator::prepare(&config).await?,
        Command::Config => {
            config.validate()?;
            print!("{config}");
        }
    }

    Ok(())
}
