//! API routes.

pub mod health;
pub mod jobs;
pub mod logs;

use crate::AppState;
use axum::Router;

/// Build the main API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(jobs::router())
        .merge(logs::router())
        .merge(health::router())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::jobs::TriggerResponse;
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use bytes::Bytes;
    use duci_core::runtime::{ContainerId, ExitCode, RuntimeLog, RuntimeOptions, Tag};
    use duci_core::{ContainerRuntime, Error, JobId, LogLine, Result};
    use duci_db::{JobRepo, StoreRecorder};
    use duci_executor::{ConcurrencyGate, ExecutorSettings, JobExecutor};
    use futures::stream;
    use serde_json::{Value, json};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    #[derive(Default)]
    struct StubRuntime {
        unhealthy: bool,
        /// Never report an exit code.
        hang: bool,
    }

    #[async_trait]
    impl ContainerRuntime for StubRuntime {
        fn name(&self) -> &'static str {
            "stub"
        }

        async fn build(
            &self,
            _context: Bytes,
            _tag: &Tag,
            _dockerfile: &str,
        ) -> Result<RuntimeLog> {
            Ok(Box::pin(stream::iter(vec![Ok(LogLine::new("built"))])))
        }

        async fn create(
            &self,
            _options: &RuntimeOptions,
            _tag: &Tag,
            command: &[String],
        ) -> Result<ContainerId> {
            Ok(ContainerId::new(command.join(" ")))
        }

        async fn start(&self, container: &ContainerId) -> Result<RuntimeLog> {
            let echoed = LogLine::new(container.to_string());
            Ok(Box::pin(stream::iter(vec![Ok(echoed)])))
        }

        async fn exit_code(&self, _container: &ContainerId) -> Result<ExitCode> {
            if self.hang {
                std::future::pending::<()>().await;
            }
            Ok(ExitCode::new(0))
        }

        async fn remove_container(&self, _container: &ContainerId) -> Result<()> {
            Ok(())
        }

        async fn remove_image(&self, _tag: &Tag) -> Result<()> {
            Ok(())
        }

        async fn status(&self) -> Result<()> {
            if self.unhealthy {
                Err(Error::Runtime("daemon unreachable".to_string()))
            } else {
                Ok(())
            }
        }
    }

    async fn state(runtime: StubRuntime) -> AppState {
        let repo = Arc::new(duci_db::open("sqlite::memory:").await.unwrap());
        let executor = JobExecutor::new(
            Arc::new(runtime),
            ConcurrencyGate::new(2).unwrap(),
            ExecutorSettings::default(),
        )
        .with_observer(Arc::new(StoreRecorder::new(repo.clone())));

        AppState::new(Arc::new(executor), repo as Arc<dyn JobRepo>, "http://ci.test/")
            .with_poll_interval(Duration::from_millis(10))
    }

    async fn app(healthy: bool) -> Router {
        let runtime = StubRuntime {
            unhealthy: !healthy,
            ..Default::default()
        };
        router(state(runtime).await)
    }

    fn post_job(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/v1/jobs")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_runtime() {
        let response = app(true).await.oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["runtime"], "stub");
        assert_eq!(body["capacity"], 2);
    }

    #[tokio::test]
    async fn test_health_unavailable_when_daemon_down() {
        let response = app(false).await.oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_trigger_rejects_empty_command() {
        let dir = tempfile::tempdir().unwrap();
        let request = post_job(json!({ "workdir": dir.path(), "command": [] }));

        let response = app(true).await.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_trigger_rejects_missing_workdir() {
        let request = post_job(json!({ "workdir": "/nonexistent/duci", "command": ["true"] }));

        let response = app(true).await.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_trigger_rejects_bad_repository() {
        let dir = tempfile::tempdir().unwrap();
        let request = post_job(json!({
            "workdir": dir.path(),
            "command": ["true"],
            "commit": { "repository": "no-slash", "sha": "abc" }
        }));

        let response = app(true).await.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_trigger_then_tail_logs() {
        let app = app(true).await;
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Dockerfile"), "FROM alpine\n").unwrap();

        let response = app
            .clone()
            .oneshot(post_job(json!({ "workdir": dir.path(), "command": ["make", "test"] })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let accepted: TriggerResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(accepted.log_url, format!("http://ci.test/logs/{}", accepted.id));

        let response = app
            .oneshot(get(&format!("/logs/{}", accepted.id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "application/x-ndjson");

        let body = tokio::time::timeout(
            Duration::from_secs(5),
            to_bytes(response.into_body(), usize::MAX),
        )
        .await
        .expect("log stream should end once the job finishes")
        .unwrap();

        let messages: Vec<String> = std::str::from_utf8(&body)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str::<LogLine>(line).unwrap().message)
            .collect();
        assert_eq!(
            messages,
            vec!["job started", "built", "make test", "job succeeded"]
        );
    }

    #[tokio::test]
    async fn test_drain_waits_for_cancelled_jobs_to_finish() {
        let state = state(StubRuntime {
            hang: true,
            ..Default::default()
        })
        .await;
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Dockerfile"), "FROM alpine\n").unwrap();

        let response = router(state.clone())
            .oneshot(post_job(json!({ "workdir": dir.path(), "command": ["sleep"] })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let accepted: TriggerResponse = serde_json::from_slice(&body).unwrap();

        state.drain(Duration::from_secs(5)).await;

        assert!(state.jobs.is_empty());
        let job = state.repo.get(accepted.id).await.unwrap();
        assert!(job.finished);
    }

    #[tokio::test]
    async fn test_logs_unknown_job_is_not_found() {
        let uri = format!("/logs/{}", JobId::new());
        let response = app(true).await.oneshot(get(&uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_logs_invalid_id_is_bad_request() {
        let response = app(true).await.oneshot(get("/logs/not-a-uuid")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
