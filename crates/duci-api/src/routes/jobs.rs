//! Job trigger endpoint.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use duci_core::{CommitRef, JobContext, JobId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/v1/jobs", post(trigger))
}

#[derive(Debug, Deserialize)]
pub struct TriggerRequest {
    /// Prepared working directory on the runner's filesystem.
    pub workdir: PathBuf,
    pub command: Vec<String>,
    #[serde(default)]
    pub commit: Option<CommitInput>,
}

#[derive(Debug, Deserialize)]
pub struct CommitInput {
    /// `owner/repo`
    pub repository: String,
    pub sha: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TriggerResponse {
    pub id: JobId,
    pub log_url: String,
}

async fn trigger(
    State(state): State<AppState>,
    Json(req): Json<TriggerRequest>,
) -> Result<(StatusCode, Json<TriggerResponse>), ApiError> {
    let TriggerRequest {
        workdir,
        command,
        commit,
    } = req;

    if command.first().is_none_or(|program| program.trim().is_empty()) {
        return Err(ApiError::BadRequest("command must not be empty".to_string()));
    }
    if !workdir.is_dir() {
        return Err(ApiError::BadRequest(format!(
            "workdir {} is not a directory",
            workdir.display()
        )));
    }

    let id = JobId::new();
    let log_url = state.log_url(&id);
    let mut ctx = JobContext::new(id)
        .with_target_url(log_url.clone())
        .with_parent(&state.shutdown);

    if let Some(commit) = commit {
        let commit = CommitRef::parse(&commit.repository, commit.sha).ok_or_else(|| {
            ApiError::BadRequest(format!("invalid repository: {}", commit.repository))
        })?;
        ctx = ctx.with_commit(commit);
    }

    // The log URL must resolve as soon as it is handed out.
    state.repo.start(id).await?;

    info!(job_id = %id, workdir = %workdir.display(), "Job accepted");

    let executor = state.executor.clone();
    state.jobs.spawn(async move {
        let _ = executor.execute(&ctx, &workdir, &command).await;
    });

    Ok((StatusCode::ACCEPTED, Json(TriggerResponse { id, log_url })))
}
