//! Lifecycle observers.
//!
//! Observers are notified when a job starts, for every log line it produces,
//! and once when it ends. Their failures never affect the job's result.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use crate::{JobContext, LogLine, Result};

#[async_trait]
pub trait JobObserver: Send + Sync {
    /// Name used when logging observer failures.
    fn name(&self) -> &'static str;

    async fn on_start(&self, ctx: &JobContext) -> Result<()>;

    async fn on_log(&self, ctx: &JobContext, line: &LogLine) -> Result<()>;

    /// Receives the job's final result: `Ok`, the failure sentinel, or the fault.
    async fn on_end(&self, ctx: &JobContext, result: &Result<()>) -> Result<()>;
}

/// Ordered list of observers, notified in registration order.
#[derive(Clone, Default)]
pub struct ObserverSet {
    observers: Vec<Arc<dyn JobObserver>>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, observer: Arc<dyn JobObserver>) {
        self.observers.push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub async fn start(&self, ctx: &JobContext) {
        for observer in &self.observers {
            if let Err(e) = observer.on_start(ctx).await {
                warn!(
                    job_id = %ctx.id,
                    observer = observer.name(),
                    error = %e,
                    "Start hook failed"
                );
            }
        }
    }

    pub async fn log(&self, ctx: &JobContext, line: &LogLine) {
        for observer in &self.observers {
            if let Err(e) = observer.on_log(ctx, line).await {
                warn!(job_id = %ctx.id, observer = observer.name(), error = %e, "Log hook failed");
            }
        }
    }

    pub async fn end(&self, ctx: &JobContext, result: &Result<()>) {
        for observer in &self.observers {
            if let Err(e) = observer.on_end(ctx, result).await {
                warn!(job_id = %ctx.id, observer = observer.name(), error = %e, "End hook failed");
            }
        }
    }
}

impl std::fmt::Debug for ObserverSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.observers.iter().map(|o| o.name()).collect();
        f.debug_struct("ObserverSet").field("observers", &names).finish()
    }
}
