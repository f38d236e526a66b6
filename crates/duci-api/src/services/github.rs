//! GitHub commit status reporting.

use async_trait::async_trait;
use duci_config::GitHubConfig;
use duci_core::status::CommitStatus;
use duci_core::{CommitRef, JobContext, JobObserver, LogLine};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("GitHub API error: {0}")]
    Api(String),
}

impl From<GitHubError> for duci_core::Error {
    fn from(err: GitHubError) -> Self {
        duci_core::Error::Internal(err.to_string())
    }
}

/// Posts a pending status when a job starts and a terminal one when it ends.
///
/// Jobs without a commit reference are not reported.
pub struct GitHubStatusReporter {
    client: reqwest::Client,
    access_token: String,
    api_url: String,
    context: String,
}

impl GitHubStatusReporter {
    pub fn new(
        access_token: impl Into<String>,
        api_url: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            access_token: access_token.into(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            context: context.into(),
        }
    }

    /// `None` when no token is configured.
    pub fn from_config(config: &GitHubConfig) -> Option<Self> {
        let token = config.token.as_deref()?;
        Some(Self::new(token, &config.api_url, &config.context))
    }

    fn statuses_url(&self, commit: &CommitRef) -> String {
        format!(
            "{}/repos/{}/{}/statuses/{}",
            self.api_url, commit.owner, commit.repo, commit.sha
        )
    }

    pub async fn report(
        &self,
        commit: &CommitRef,
        status: &CommitStatus,
    ) -> Result<(), GitHubError> {
        let response = self
            .client
            .post(self.statuses_url(commit))
            .header("Authorization", format!("Bearer {}", self.access_token))
            .header("User-Agent", "duci")
            .header("Accept", "application/vnd.github+json")
            .json(status)
            .send()
            .await
            .map_err(|e| GitHubError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let code = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(GitHubError::Api(format!(
                "status update failed ({}): {}",
                code, text
            )));
        }

        debug!(sha = %commit.sha, state = %status.state, "Reported commit status");
        Ok(())
    }
}

#[async_trait]
impl JobObserver for GitHubStatusReporter {
    fn name(&self) -> &'static str {
        "github"
    }

    async fn on_start(&self, ctx: &JobContext) -> duci_core::Result<()> {
        if let Some(commit) = &ctx.commit {
            let status = CommitStatus::running(&self.context, ctx.target_url.clone());
            self.report(commit, &status).await?;
        }
        Ok(())
    }

    async fn on_log(&self, _ctx: &JobContext, _line: &LogLine) -> duci_core::Result<()> {
        Ok(())
    }

    async fn on_end(
        &self,
        ctx: &JobContext,
        result: &duci_core::Result<()>,
    ) -> duci_core::Result<()> {
        if let Some(commit) = &ctx.commit {
            let status = CommitStatus::finished(result, &self.context, ctx.target_url.clone());
            self.report(commit, &status).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use duci_core::{Error, ExitCode, JobId};
    use serde_json::Value;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured {
        requests: Arc<Mutex<Vec<(String, String, Value)>>>,
    }

    async fn record(
        State(captured): State<Captured>,
        Path((owner, repo, sha)): Path<(String, String, String)>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> StatusCode {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        captured
            .requests
            .lock()
            .unwrap()
            .push((format!("{}/{}@{}", owner, repo, sha), auth, body));
        StatusCode::CREATED
    }

    async fn fake_github() -> (String, Captured) {
        let captured = Captured::default();
        let app = Router::new()
            .route("/repos/{owner}/{repo}/statuses/{sha}", post(record))
            .with_state(captured.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), captured)
    }

    fn ctx() -> JobContext {
        JobContext::new(JobId::new())
            .with_target_url("http://ci.test/logs/1")
            .with_commit(CommitRef::parse("octo/widgets", "abc123").unwrap())
    }

    #[test]
    fn test_from_config_requires_token() {
        assert!(GitHubStatusReporter::from_config(&GitHubConfig::default()).is_none());

        let config = GitHubConfig {
            token: Some("t0k".to_string()),
            ..Default::default()
        };
        let reporter = GitHubStatusReporter::from_config(&config).unwrap();
        let commit = CommitRef::parse("octo/widgets", "abc123").unwrap();
        assert_eq!(
            reporter.statuses_url(&commit),
            "https://api.github.com/repos/octo/widgets/statuses/abc123"
        );
    }

    #[tokio::test]
    async fn test_reports_pending_then_terminal_state() {
        let (api_url, captured) = fake_github().await;
        let reporter = GitHubStatusReporter::new("t0k", api_url, "duci");
        let ctx = ctx();

        reporter.on_start(&ctx).await.unwrap();
        reporter
            .on_end(&ctx, &Err(Error::Failure(ExitCode::new(1))))
            .await
            .unwrap();

        let requests = captured.requests.lock().unwrap().clone();
        assert_eq!(requests.len(), 2);

        let (target, auth, pending) = &requests[0];
        assert_eq!(target, "octo/widgets@abc123");
        assert_eq!(auth, "Bearer t0k");
        assert_eq!(pending["state"], "pending");
        assert_eq!(pending["description"], "running");
        assert_eq!(pending["context"], "duci");
        assert_eq!(pending["target_url"], "http://ci.test/logs/1");

        let (_, _, terminal) = &requests[1];
        assert_eq!(terminal["state"], "failure");
        assert_eq!(terminal["description"], "failure in run");
    }

    #[tokio::test]
    async fn test_error_description_is_truncated() {
        let (api_url, captured) = fake_github().await;
        let reporter = GitHubStatusReporter::new("t0k", api_url, "duci");
        let long = "x".repeat(80);

        reporter
            .on_end(&ctx(), &Err(Error::Runtime(long)))
            .await
            .unwrap();

        let requests = captured.requests.lock().unwrap().clone();
        let description = requests[0].2["description"].as_str().unwrap().to_string();
        assert_eq!(requests[0].2["state"], "error");
        assert_eq!(description.chars().count(), 53);
        assert!(description.ends_with("..."));
    }

    #[tokio::test]
    async fn test_jobs_without_commit_are_skipped() {
        let reporter = GitHubStatusReporter::new("t0k", "http://127.0.0.1:1", "duci");
        let ctx = JobContext::new(JobId::new());

        reporter.on_start(&ctx).await.unwrap();
        reporter.on_end(&ctx, &Ok(())).await.unwrap();
    }

    #[tokio::test]
    async fn test_api_rejection_is_an_error() {
        let app = Router::new().route(
            "/repos/{owner}/{repo}/statuses/{sha}",
            post(|| async { StatusCode::UNPROCESSABLE_ENTITY }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let reporter = GitHubStatusReporter::new("t0k", format!("http://{}", addr), "duci");
        let commit = CommitRef::parse("octo/widgets", "abc123").unwrap();
        let result = reporter
            .report(&commit, &CommitStatus::running("duci", None))
            .await;

        assert!(matches!(result, Err(GitHubError::Api(_))));
    }
}
