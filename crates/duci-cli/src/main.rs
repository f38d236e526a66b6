//! duci CLI tool.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "duci")]
#[command(about = "duci CI runner CLI", long_about = None)]
struct Cli {
    /// Server URL
    #[arg(long, env = "DUCI_SERVER", default_value = "http://localhost:8080")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build and run a job locally against the Docker daemon
    Run {
        /// Prepared working directory
        workdir: PathBuf,
        /// System configuration file
        #[arg(long, default_value = "duci.kdl")]
        config: PathBuf,
        /// Override the job timeout
        #[arg(long)]
        timeout_secs: Option<u64>,
        /// Command to run in the container
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
    /// Stream a job's log from the server
    Logs {
        /// Job ID
        id: String,
    },
    /// Check the server and its container daemon
    Health,
    /// Validate configuration files
    Validate {
        /// System configuration file
        #[arg(long, default_value = "duci.kdl")]
        config: PathBuf,
        /// Working directory whose .duci/config.yml to check
        #[arg(long)]
        workdir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            workdir,
            config,
            timeout_secs,
            command,
        } => {
            commands::run::run_local(&workdir, &config, timeout_secs, command).await?;
        }
        Commands::Logs { id } => {
            commands::logs::follow(&cli.server, &id).await?;
        }
        Commands::Health => {
            commands::health(&cli.server).await?;
        }
        Commands::Validate { config, workdir } => {
            commands::validate(&config, workdir.as_deref())?;
        }
    }

    Ok(())
}
