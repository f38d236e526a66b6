//! duci server

use anyhow::Context;
use clap::Parser;
use duci_api::services::GitHubStatusReporter;
use duci_api::{AppState, routes};
use duci_config::SystemConfig;
use duci_core::ContainerRuntime;
use duci_db::{JobRepo, StoreRecorder};
use duci_executor::{ConcurrencyGate, DockerRuntime, ExecutorSettings, JobExecutor};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// How long running jobs get to report their end after cancellation.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "duci-server")]
#[command(about = "duci CI runner server", long_about = None)]
struct Args {
    /// Path to the system configuration file
    #[arg(long, short, env = "DUCI_CONFIG", default_value = "duci.kdl")]
    config: PathBuf,

    /// Override the listen address
    #[arg(long, env = "DUCI_LISTEN")]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = if args.config.exists() {
        SystemConfig::load(&args.config)
            .with_context(|| format!("failed to load {}", args.config.display()))?
    } else {
        warn!(path = %args.config.display(), "Config file not found, using defaults");
        SystemConfig::default()
    };
    if let Some(listen) = args.listen {
        config.server.listen = listen;
    }

    info!(url = %config.store.url, "Opening job store...");
    let repo = Arc::new(duci_db::open(&config.store.url).await?);

    let runtime = DockerRuntime::new()?;
    if let Err(e) = runtime.status().await {
        warn!(error = %e, "Container daemon not reachable yet");
    }

    let gate = ConcurrencyGate::new(config.job.concurrency)?;
    info!(
        concurrency = config.job.concurrency,
        timeout = ?config.job.timeout,
        "Job gate configured"
    );

    let mut executor = JobExecutor::new(
        Arc::new(runtime),
        gate,
        ExecutorSettings::from(&config.job),
    )
    .with_observer(Arc::new(StoreRecorder::new(repo.clone())));

    match GitHubStatusReporter::from_config(&config.github) {
        Some(reporter) => executor = executor.with_observer(Arc::new(reporter)),
        None => info!("No GitHub token configured, commit statuses disabled"),
    }

    let state = AppState::new(
        Arc::new(executor),
        repo.clone() as Arc<dyn JobRepo>,
        &config.server.base_url,
    );
    let shutdown = state.shutdown.clone();

    let app = routes::router(state.clone()).layer(TraceLayer::new_for_http());

    info!("Starting server on {}", config.server.listen);
    let listener = TcpListener::bind(&config.server.listen).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down, cancelling running jobs");
            shutdown.cancel();
        })
        .await?;

    state.drain(SHUTDOWN_GRACE).await;
    repo.close().await;
    Ok(())
}
