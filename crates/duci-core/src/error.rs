//! Error types for duci.

use std::time::Duration;

use thiserror::Error;

use crate::runtime::{ContainerId, ExitCode};

#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// The engine rejected the build context or Dockerfile.
    #[error("build failed: {0}")]
    Build(String),

    /// Container creation, start or log attachment failed. The container may
    /// already exist and still need removal.
    #[error("run failed: {message}")]
    Run {
        container: Option<ContainerId>,
        message: String,
    },

    /// The job's own command exited nonzero.
    #[error("failure in run: exit code {0}")]
    Failure(ExitCode),

    #[error("deadline exceeded after {0:?}")]
    Timeout(Duration),

    #[error("cancelled")]
    Cancelled,

    #[error("container runtime error: {0}")]
    Runtime(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn run(message: impl Into<String>) -> Self {
        Error::Run {
            container: None,
            message: message.into(),
        }
    }

    /// True when the user's command failed, as opposed to the system failing
    /// to run it.
    pub fn is_failure(&self) -> bool {
        matches!(self, Error::Failure(_))
    }

    /// Container left behind by a failed run, if any.
    pub fn container(&self) -> Option<&ContainerId> {
        match self {
            Error::Run { container, .. } => container.as_ref(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
