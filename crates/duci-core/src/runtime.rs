//! Container runtime seam.
//!
//! The executor builds an image from a build context, runs a container from
//! it, waits for the exit code and cleans up. Engines implement
//! [`ContainerRuntime`]; the Docker implementation lives in `duci-executor`.

use async_trait::async_trait;
use bytes::Bytes;
use derive_more::Display;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::{Error, LogLine, Result};

/// Log produced by a build or a run, in the order the engine emitted it.
pub type RuntimeLog = BoxStream<'static, Result<LogLine>>;

/// Image name assigned to the image built for one run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct Tag(String);

impl Tag {
    /// Fresh tag, unique per run.
    pub fn generate() -> Self {
        Self(format!("duci-{}", Uuid::new_v4().simple()))
    }

    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct ContainerId(String);

impl ContainerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct ExitCode(i64);

impl ExitCode {
    pub fn new(code: i64) -> Self {
        Self(code)
    }

    pub fn code(&self) -> i64 {
        self.0
    }

    pub fn is_failure(&self) -> bool {
        self.0 != 0
    }
}

/// Environment and volume settings read from the working directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeOptions {
    pub environment: BTreeMap<String, String>,
    pub volumes: Vec<String>,
}

impl RuntimeOptions {
    /// Environment in `KEY=value` form.
    pub fn env_pairs(&self) -> Vec<String> {
        self.environment
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect()
    }
}

/// Trait for container engines.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Name of this runtime.
    fn name(&self) -> &'static str;

    /// Build an image tagged `tag` from a tarred build context.
    async fn build(&self, context: Bytes, tag: &Tag, dockerfile: &str) -> Result<RuntimeLog>;

    /// Create a container from `tag` without starting it.
    async fn create(
        &self,
        options: &RuntimeOptions,
        tag: &Tag,
        command: &[String],
    ) -> Result<ContainerId>;

    /// Start a created container and attach to its combined output.
    async fn start(&self, container: &ContainerId) -> Result<RuntimeLog>;

    /// Create and start a container.
    ///
    /// On failure after creation the error carries the container id
    /// (see [`crate::Error::container`]).
    async fn run(
        &self,
        options: &RuntimeOptions,
        tag: &Tag,
        command: &[String],
    ) -> Result<(ContainerId, RuntimeLog)> {
        let container = self.create(options, tag, command).await?;
        match self.start(&container).await {
            Ok(log) => Ok((container, log)),
            Err(Error::Run { message, .. }) => Err(Error::Run {
                container: Some(container),
                message,
            }),
            Err(e) => Err(Error::Run {
                container: Some(container),
                message: e.to_string(),
            }),
        }
    }

    /// Block until the container stops and return its exit code.
    async fn exit_code(&self, container: &ContainerId) -> Result<ExitCode>;

    async fn remove_container(&self, container: &ContainerId) -> Result<()>;

    async fn remove_image(&self, tag: &Tag) -> Result<()>;

    /// Health check for the engine.
    async fn status(&self) -> Result<()>;
}

/// Keep only what a terminal would show after in-place progress updates:
/// the text following the last carriage return.
pub fn trim_progress(line: &str) -> &str {
    let line = line.trim_end_matches(['\r', '\n']);
    line.rsplit('\r').next().unwrap_or(line)
}

/// Split a chunk of engine output into log messages.
pub fn split_lines(chunk: &str) -> Vec<String> {
    chunk
        .split_terminator('\n')
        .map(|line| trim_progress(line).to_string())
        .collect()
}
