//! Job records and log lines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, JobId, Result};

/// One unit of captured output or lifecycle annotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl LogLine {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            message: message.into(),
        }
    }
}

/// Persisted record for one job.
///
/// `stream` only ever grows and `finished` never goes back to false.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub finished: bool,
    pub stream: Vec<LogLine>,
}

impl Job {
    /// Empty, unfinished record.
    pub fn new(id: JobId) -> Self {
        Self {
            id,
            finished: false,
            stream: Vec::new(),
        }
    }

    pub fn append(&mut self, line: LogLine) {
        self.stream.push(line);
    }

    pub fn finish(&mut self) {
        self.finished = true;
    }
}

/// Three-way classification of a finished execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
    Error,
}

impl Outcome {
    pub fn of(result: &Result<()>) -> Self {
        match result {
            Ok(()) => Outcome::Success,
            Err(Error::Failure(_)) => Outcome::Failure,
            Err(_) => Outcome::Error,
        }
    }
}
