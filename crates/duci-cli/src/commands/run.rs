//! Local job execution command.

use anyhow::{Context, Result};
use async_trait::async_trait;
use duci_config::SystemConfig;
use duci_core::{Error, JobContext, JobId, JobObserver, LogLine};
use duci_executor::{ConcurrencyGate, DockerRuntime, ExecutorSettings, JobExecutor};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Prints a job's lifecycle and output to the terminal.
struct ConsolePrinter;

pub(crate) fn format_line(line: &LogLine) -> String {
    format!("[{}] {}", line.timestamp.format("%H:%M:%S"), line.message)
}

#[async_trait]
impl JobObserver for ConsolePrinter {
    fn name(&self) -> &'static str {
        "console"
    }

    async fn on_start(&self, ctx: &JobContext) -> duci_core::Result<()> {
        println!("==> Job {}", ctx.id);
        Ok(())
    }

    async fn on_log(&self, _ctx: &JobContext, line: &LogLine) -> duci_core::Result<()> {
        println!("{}", format_line(line));
        Ok(())
    }

    async fn on_end(
        &self,
        ctx: &JobContext,
        result: &duci_core::Result<()>,
    ) -> duci_core::Result<()> {
        match result {
            Ok(()) => println!("==> Job {} succeeded", ctx.id),
            Err(e) => println!("==> Job {}: {}", ctx.id, e),
        }
        Ok(())
    }
}

/// Build `workdir` and run `command` against the local Docker daemon.
///
/// A nonzero exit of the job's command becomes this process's exit code.
pub async fn run_local(
    workdir: &Path,
    config_path: &Path,
    timeout_secs: Option<u64>,
    command: Vec<String>,
) -> Result<()> {
    let workdir = workdir
        .canonicalize()
        .with_context(|| format!("Failed to resolve working directory: {}", workdir.display()))?;

    let config = if config_path.exists() {
        SystemConfig::load(config_path)
            .with_context(|| format!("Failed to load {}", config_path.display()))?
    } else {
        SystemConfig::default()
    };

    let mut settings = ExecutorSettings::from(&config.job);
    if let Some(secs) = timeout_secs {
        settings.timeout = Duration::from_secs(secs);
    }

    let runtime = DockerRuntime::new().context("Failed to connect to Docker")?;
    let executor = JobExecutor::new(Arc::new(runtime), ConcurrencyGate::new(1)?, settings)
        .with_observer(Arc::new(ConsolePrinter));

    let ctx = JobContext::new(JobId::new());
    let cancel = ctx.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let result = executor.execute(&ctx, &workdir, &command).await;
    executor.shutdown().await;

    match result {
        Ok(()) => Ok(()),
        Err(Error::Failure(code)) => std::process::exit(exit_status(code.code())),
        Err(e) => Err(e.into()),
    }
}

/// Map a container exit code onto a nonzero process exit status.
fn exit_status(code: i64) -> i32 {
    match i32::try_from(code) {
        Ok(0) | Err(_) => 1,
        Ok(code) => code,
    }
}
