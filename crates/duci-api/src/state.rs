//! Application state.

use duci_db::JobRepo;
use duci_executor::JobExecutor;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub executor: Arc<JobExecutor>,
    pub repo: Arc<dyn JobRepo>,
    /// Public URL prefix for log links.
    pub base_url: String,
    pub poll_interval: Duration,
    /// Parent of every job's cancellation token.
    pub shutdown: CancellationToken,
    /// Accepted jobs still running, end hooks included.
    pub jobs: TaskTracker,
}

impl AppState {
    pub fn new(
        executor: Arc<JobExecutor>,
        repo: Arc<dyn JobRepo>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            executor,
            repo,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            poll_interval: duci_db::tail::DEFAULT_POLL_INTERVAL,
            shutdown: CancellationToken::new(),
            jobs: TaskTracker::new(),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn log_url(&self, id: &duci_core::JobId) -> String {
        format!("{}/logs/{}", self.base_url, id)
    }

    /// Cancel running jobs and wait up to `grace` for them to report.
    ///
    /// Container cleanup is always awaited. The store stays open; close it after this returns.
    pub async fn drain(&self, grace: Duration) {
        self.shutdown.cancel();
        self.jobs.close();
        info!(running = self.jobs.len(), "Draining jobs");

        if tokio::time::timeout(grace, self.jobs.wait()).await.is_err() {
            warn!(pending = self.jobs.len(), ?grace, "Jobs still reporting after grace period");
        }
        self.executor.shutdown().await;
    }
}
