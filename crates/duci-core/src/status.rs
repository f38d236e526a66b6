//! Commit status vocabulary shared by status reporters.

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Longest description a status may carry.
pub const MAX_DESCRIPTION_LEN: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum CommitState {
    #[display("pending")]
    Pending,
    #[display("success")]
    Success,
    #[display("failure")]
    Failure,
    #[display("error")]
    Error,
}

/// A status notification for one job transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitStatus {
    pub state: CommitState,
    pub description: String,
    pub context: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,
}

impl CommitStatus {
    pub fn new(
        state: CommitState,
        description: &str,
        context: impl Into<String>,
        target_url: Option<String>,
    ) -> Self {
        Self {
            state,
            description: truncate_description(description),
            context: context.into(),
            target_url,
        }
    }

    /// Status sent when a job starts running.
    pub fn running(context: impl Into<String>, target_url: Option<String>) -> Self {
        Self::new(CommitState::Pending, "running", context, target_url)
    }

    /// Terminal status for a job's final result.
    pub fn finished(
        result: &Result<()>,
        context: impl Into<String>,
        target_url: Option<String>,
    ) -> Self {
        match result {
            Ok(()) => Self::new(CommitState::Success, "success", context, target_url),
            Err(Error::Failure(_)) => {
                Self::new(CommitState::Failure, "failure in run", context, target_url)
            }
            Err(e) => Self::new(CommitState::Error, &e.to_string(), context, target_url),
        }
    }
}

/// Cut a description to [`MAX_DESCRIPTION_LEN`] characters, marking the cut with `...`.
pub fn truncate_description(description: &str) -> String {
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        let head: String = description.chars().take(MAX_DESCRIPTION_LEN).collect();
        format!("{}...", head)
    } else {
        description.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ExitCode;

    #[test]
    fn test_short_description_untouched() {
        assert_eq!(truncate_description("success"), "success");
        let exact = "x".repeat(MAX_DESCRIPTION_LEN);
        assert_eq!(truncate_description(&exact), exact);
    }

    #[test]
    fn test_long_description_truncated() {
        let long = "y".repeat(MAX_DESCRIPTION_LEN + 10);
        let truncated = truncate_description(&long);
        assert_eq!(truncated, format!("{}...", "y".repeat(MAX_DESCRIPTION_LEN)));
    }

    #[test]
    fn test_truncation_counts_characters() {
        let long = "é".repeat(MAX_DESCRIPTION_LEN + 1);
        let truncated = truncate_description(&long);
        assert_eq!(truncated.chars().count(), MAX_DESCRIPTION_LEN + 3);
    }

    #[test]
    fn test_finished_states() {
        let ok = CommitStatus::finished(&Ok(()), "duci", None);
        assert_eq!(ok.state, CommitState::Success);

        let failed = CommitStatus::finished(&Err(Error::Failure(ExitCode::new(3))), "duci", None);
        assert_eq!(failed.state, CommitState::Failure);
        assert_eq!(failed.description, "failure in run");

        let errored = CommitStatus::finished(
            &Err(Error::Build("Cannot locate specified Dockerfile".to_string())),
            "duci",
            Some("http://ci/logs/1".to_string()),
        );
        assert_eq!(errored.state, CommitState::Error);
        assert_eq!(
            errored.description,
            "build failed: Cannot locate specified Dockerfile"
        );
        assert_eq!(errored.target_url.as_deref(), Some("http://ci/logs/1"));
    }

    #[test]
    fn test_state_serializes_lowercase() {
        let status = CommitStatus::running("duci", None);
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "pending");
        assert_eq!(json["description"], "running");
        assert!(json.get("target_url").is_none());
    }
}
