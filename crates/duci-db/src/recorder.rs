//! Observer that records job executions into the store.

use async_trait::async_trait;
use duci_core::{Error, JobContext, JobObserver, LogLine, Outcome, Result};
use std::sync::Arc;

use crate::JobRepo;

/// Writes the job's record: a fresh record on start, every log line as it
/// arrives, and a closing line plus the finished flag on end.
pub struct StoreRecorder {
    repo: Arc<dyn JobRepo>,
}

impl StoreRecorder {
    pub fn new(repo: Arc<dyn JobRepo>) -> Self {
        Self { repo }
    }
}

fn closing_line(result: &Result<()>) -> String {
    match (Outcome::of(result), result) {
        (_, Ok(())) => "job succeeded".to_string(),
        (Outcome::Failure, Err(e)) => format!("job failed: {}", e),
        (_, Err(e)) => format!("job errored: {}", e),
    }
}

#[async_trait]
impl JobObserver for StoreRecorder {
    fn name(&self) -> &'static str {
        "store"
    }

    async fn on_start(&self, ctx: &JobContext) -> Result<()> {
        self.repo.start(ctx.id).await?;
        self.repo.append(ctx.id, LogLine::new("job started")).await?;
        Ok(())
    }

    async fn on_log(&self, ctx: &JobContext, line: &LogLine) -> Result<()> {
        self.repo
            .append(ctx.id, line.clone())
            .await
            .map_err(Error::from)
    }

    async fn on_end(&self, ctx: &JobContext, result: &Result<()>) -> Result<()> {
        self.repo
            .append(ctx.id, LogLine::new(closing_line(result)))
            .await?;
        self.repo.finish(ctx.id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duci_core::{ExitCode, JobId};

    #[tokio::test]
    async fn test_records_full_lifecycle() {
        let repo = Arc::new(crate::open("sqlite::memory:").await.unwrap());
        let recorder = StoreRecorder::new(repo.clone());
        let ctx = JobContext::new(JobId::new());

        recorder.on_start(&ctx).await.unwrap();
        recorder.on_log(&ctx, &LogLine::new("compiling")).await.unwrap();
        recorder
            .on_end(&ctx, &Err(Error::Failure(ExitCode::new(3))))
            .await
            .unwrap();

        let job = repo.get(ctx.id).await.unwrap();
        let messages: Vec<_> = job.stream.iter().map(|l| l.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "job started",
                "compiling",
                "job failed: failure in run: exit code 3"
            ]
        );
        assert!(job.finished);
    }

    #[test]
    fn test_closing_line() {
        assert_eq!(closing_line(&Ok(())), "job succeeded");
        assert_eq!(
            closing_line(&Err(Error::Cancelled)),
            "job errored: cancelled"
        );
    }
}
