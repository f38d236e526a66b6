//! Job executor: one build-and-run under a deadline.
//!
//! The build/run/reap bracket runs on its own task. The executor waits for
//! it, the deadline and the job's cancellation token, whichever comes first.

use duci_config::{JobConfig, load_runtime_options};
use duci_core::runtime::{ContainerId, ContainerRuntime, ExitCode, RuntimeLog, Tag};
use duci_core::{Error, JobContext, JobObserver, ObserverSet, Result};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::context::{build_context, dockerfile_path};
use crate::gate::ConcurrencyGate;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorSettings {
    /// Deadline covering gate wait, build, run and cleanup.
    pub timeout: Duration,
    /// Remove the run's image once its container is gone.
    pub cleanup_images: bool,
    /// On deadline or cancellation, abort the run and remove its container.
    /// When false the run is left detached and keeps its gate slot until it ends.
    pub reap_abandoned: bool,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(600),
            cleanup_images: false,
            reap_abandoned: true,
        }
    }
}

impl From<&JobConfig> for ExecutorSettings {
    fn from(config: &JobConfig) -> Self {
        Self {
            timeout: config.timeout,
            cleanup_images: config.cleanup_images,
            reap_abandoned: config.reap_abandoned,
        }
    }
}

/// Runs jobs against a container runtime, bounded by a shared gate.
pub struct JobExecutor {
    runtime: Arc<dyn ContainerRuntime>,
    gate: ConcurrencyGate,
    observers: ObserverSet,
    settings: ExecutorSettings,
    /// Cleanup of abandoned runs, drained by [`shutdown`](Self::shutdown).
    reapers: TaskTracker,
}

impl JobExecutor {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        gate: ConcurrencyGate,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            runtime,
            gate,
            observers: ObserverSet::new(),
            settings,
            reapers: TaskTracker::new(),
        }
    }

    /// Register an observer. Observers are notified in registration order.
    pub fn with_observer(mut self, observer: Arc<dyn JobObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    /// Wait for every pending cleanup of abandoned runs.
    ///
    /// Call before the process exits so reaped containers are actually removed.
    pub async fn shutdown(&self) {
        self.reapers.close();
        if !self.reapers.is_empty() {
            info!(pending = self.reapers.len(), "Waiting for container cleanup");
        }
        self.reapers.wait().await;
    }

    /// Build `workdir` into an image and run `command` in it.
    ///
    /// Returns `Ok(())` on exit code 0, [`Error::Failure`] on a nonzero exit,
    /// [`Error::Timeout`] or [`Error::Cancelled`] when the wait is abandoned,
    /// and any other error when the system failed to run the job.
    pub async fn execute(
        &self,
        ctx: &JobContext,
        workdir: &Path,
        command: &[String],
    ) -> Result<()> {
        info!(job_id = %ctx.id, workdir = %workdir.display(), ?command, "Executing job");
        self.observers.start(ctx).await;

        let result = self.run_under_deadline(ctx, workdir, command).await;

        match &result {
            Ok(()) => info!(job_id = %ctx.id, "Job succeeded"),
            Err(e) if e.is_failure() => warn!(job_id = %ctx.id, error = %e, "Job failed"),
            Err(e) => error!(job_id = %ctx.id, error = %e, "Job errored"),
        }

        self.observers.end(ctx, &result).await;
        result
    }

    async fn run_under_deadline(
        &self,
        ctx: &JobContext,
        workdir: &Path,
        command: &[String],
    ) -> Result<()> {
        let run = JobRun {
            runtime: self.runtime.clone(),
            gate: self.gate.clone(),
            observers: self.observers.clone(),
            ctx: ctx.clone(),
            workdir: workdir.to_path_buf(),
            command: command.to_vec(),
            tag: Tag::generate(),
            cleanup_images: self.settings.cleanup_images,
            started: Arc::new(Mutex::new(None)),
            abandoned: CancellationToken::new(),
        };
        let started = run.started.clone();
        let abandoned = run.abandoned.clone();
        let tag = run.tag.clone();

        let mut task = tokio::spawn(run.execute());

        let cause = tokio::select! {
            joined = &mut task => {
                return joined
                    .unwrap_or_else(|e| Err(Error::Internal(format!("job task failed: {}", e))));
            }
            _ = tokio::time::sleep(self.settings.timeout) => Error::Timeout(self.settings.timeout),
            _ = ctx.cancel.cancelled() => Error::Cancelled,
        };

        warn!(job_id = %ctx.id, error = %cause, "Abandoning job");
        abandoned.cancel();
        if self.settings.reap_abandoned {
            self.reap(ctx, task, started, tag);
        }
        Err(cause)
    }

    /// Abort an abandoned run and remove what it left behind.
    fn reap(
        &self,
        ctx: &JobContext,
        task: JoinHandle<Result<()>>,
        started: Arc<Mutex<Option<ContainerId>>>,
        tag: Tag,
    ) {
        task.abort();

        let runtime = self.runtime.clone();
        let cleanup_images = self.settings.cleanup_images;
        let job_id = ctx.id;

        self.reapers.spawn(async move {
            // The task has been dropped once the handle resolves.
            let _ = task.await;

            let container = started.lock().ok().and_then(|mut slot| slot.take());
            if let Some(container) = container {
                match runtime.remove_container(&container).await {
                    Ok(()) => info!(job_id = %job_id, container = %container, "Reaped container"),
                    Err(e) => warn!(
                        job_id = %job_id,
                        container = %container,
                        error = %e,
                        "Failed to reap container"
                    ),
                }
            }
            if cleanup_images {
                if let Err(e) = runtime.remove_image(&tag).await {
                    debug!(job_id = %job_id, tag = %tag, error = %e, "No image to remove");
                }
            }
        });
    }
}

/// Everything one run needs, moved onto its own task.
struct JobRun {
    runtime: Arc<dyn ContainerRuntime>,
    gate: ConcurrencyGate,
    observers: ObserverSet,
    ctx: JobContext,
    workdir: PathBuf,
    command: Vec<String>,
    tag: Tag,
    cleanup_images: bool,
    /// Container currently owned by the run, for the reaper.
    started: Arc<Mutex<Option<ContainerId>>>,
    /// Cancelled once the executor has stopped waiting on this run.
    abandoned: CancellationToken,
}

impl JobRun {
    async fn execute(self) -> Result<()> {
        let _slot = self.gate.acquire().await?;
        debug!(job_id = %self.ctx.id, running = self.gate.running(), "Acquired build slot");

        self.build().await?;
        let result = self.run_container().await;

        if self.cleanup_images {
            if let Err(e) = self.runtime.remove_image(&self.tag).await {
                warn!(job_id = %self.ctx.id, tag = %self.tag, error = %e, "Failed to remove image");
            }
        }
        result
    }

    async fn build(&self) -> Result<()> {
        let context = build_context(&self.workdir).await?;
        let dockerfile = dockerfile_path(&self.workdir);
        let log = self.runtime.build(context, &self.tag, dockerfile).await?;
        self.forward(log).await
    }

    async fn run_container(&self) -> Result<()> {
        let options = load_runtime_options(&self.workdir)?;

        let container = match self.runtime.create(&options, &self.tag, &self.command).await {
            Ok(container) => container,
            Err(e) => {
                if let Some(container) = e.container() {
                    let removed = self.runtime.remove_container(container).await;
                    self.log_removal_failure(container, removed);
                }
                return Err(e);
            }
        };
        self.track(Some(container.clone()));

        let code = self.wait_for_exit(&container).await;
        let removed = self.runtime.remove_container(&container).await;
        self.track(None);

        // First failure wins: a failed run hides a failed removal.
        match code {
            Ok(code) if !code.is_failure() => removed,
            Ok(code) => {
                self.log_removal_failure(&container, removed);
                Err(Error::Failure(code))
            }
            Err(e) => {
                self.log_removal_failure(&container, removed);
                Err(e)
            }
        }
    }

    async fn wait_for_exit(&self, container: &ContainerId) -> Result<ExitCode> {
        let log = self.runtime.start(container).await?;
        self.forward(log).await?;
        self.runtime.exit_code(container).await
    }

    async fn forward(&self, mut log: RuntimeLog) -> Result<()> {
        while let Some(line) = log.next().await {
            let line = line?;
            // The result has already been reported once the run is abandoned.
            if !self.abandoned.is_cancelled() {
                self.observers.log(&self.ctx, &line).await;
            }
        }
        Ok(())
    }

    fn log_removal_failure(&self, container: &ContainerId, removed: Result<()>) {
        if let Err(e) = removed {
            warn!(
                job_id = %self.ctx.id,
                container = %container,
                error = %e,
                "Failed to remove container"
            );
        }
    }

    fn track(&self, container: Option<ContainerId>) {
        if let Ok(mut slot) = self.started.lock() {
            *slot = container;
        }
    }
}
