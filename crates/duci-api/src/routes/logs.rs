//! Log streaming endpoint.
//!
//! Streams a job's lines as newline-delimited JSON, following the job until it
//! finishes.

use axum::Router;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use duci_core::JobId;
use duci_db::{DbError, LogTail};
use futures::StreamExt;

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new().route("/logs/{id}", get(tail_logs))
}

async fn tail_logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id: JobId = id
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid job id: {}", id)))?;

    // Unknown jobs are reported before the stream starts.
    state.repo.get(id).await?;

    let lines = LogTail::new(state.repo.clone(), id)
        .with_interval(state.poll_interval)
        .into_stream()
        .map(|line| {
            let mut json = serde_json::to_string(&line?)?;
            json.push('\n');
            Ok::<_, DbError>(json)
        });

    Ok((
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(lines),
    )
        .into_response())
}
