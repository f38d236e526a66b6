//! Per-job execution context.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::JobId;

/// Commit a job reports its status against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRef {
    pub owner: String,
    pub repo: String,
    pub sha: String,
}

impl CommitRef {
    /// Parse `owner/repo` plus a sha.
    pub fn parse(full_name: &str, sha: impl Into<String>) -> Option<Self> {
        let (owner, repo) = full_name.split_once('/')?;
        if owner.is_empty() || repo.is_empty() || repo.contains('/') {
            return None;
        }
        Some(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            sha: sha.into(),
        })
    }
}

/// Context handed to the executor and every observer of one job.
///
/// Cancelling `cancel` (or any parent token it was derived from) stops the
/// executor waiting on the job exactly like a deadline does.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub id: JobId,
    /// Link to the job's log, used in status descriptions.
    pub target_url: Option<String>,
    pub commit: Option<CommitRef>,
    pub cancel: CancellationToken,
}

impl JobContext {
    pub fn new(id: JobId) -> Self {
        Self {
            id,
            target_url: None,
            commit: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_target_url(mut self, url: impl Into<String>) -> Self {
        self.target_url = Some(url.into());
        self
    }

    pub fn with_commit(mut self, commit: CommitRef) -> Self {
        self.commit = Some(commit);
        self
    }

    /// Tie this job to a parent token so cancelling the parent cancels it.
    pub fn with_parent(mut self, parent: &CancellationToken) -> Self {
        self.cancel = parent.child_token();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_ref_parse() {
        let commit = CommitRef::parse("duck8823/duci", "abc").unwrap();
        assert_eq!(commit.owner, "duck8823");
        assert_eq!(commit.repo, "duci");
        assert_eq!(commit.sha, "abc");

        assert!(CommitRef::parse("no-slash", "abc").is_none());
        assert!(CommitRef::parse("/repo", "abc").is_none());
        assert!(CommitRef::parse("a/b/c", "abc").is_none());
    }

    #[test]
    fn test_parent_cancellation_propagates() {
        let parent = CancellationToken::new();
        let ctx = JobContext::new(JobId::new()).with_parent(&parent);
        assert!(!ctx.cancel.is_cancelled());
        parent.cancel();
        assert!(ctx.cancel.is_cancelled());
    }
}
