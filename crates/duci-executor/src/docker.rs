//! Docker implementation of the container runtime.

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, LogOutput, LogsOptions, RemoveContainerOptions,
    StartContainerOptions, WaitContainerOptions,
};
use bollard::image::{BuildImageOptions, RemoveImageOptions};
use bollard::models::{BuildInfo, HostConfig};
use bytes::Bytes;
use duci_core::runtime::{
    ContainerId, ContainerRuntime, ExitCode, RuntimeLog, RuntimeOptions, Tag, split_lines,
};
use duci_core::{Error, LogLine, Result};
use futures::StreamExt;
use futures::stream;
use tracing::{debug, info};

/// Container runtime backed by the local Docker daemon.
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect to the local Docker daemon.
    pub fn new() -> Result<Self> {
        let docker =
            Docker::connect_with_local_defaults().map_err(|e| Error::Runtime(e.to_string()))?;
        Ok(Self { docker })
    }

    /// Create with a custom Docker client.
    pub fn with_client(docker: Docker) -> Self {
        Self { docker }
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn build(&self, context: Bytes, tag: &Tag, dockerfile: &str) -> Result<RuntimeLog> {
        info!(tag = %tag, dockerfile = %dockerfile, "Building image");
        let options = BuildImageOptions {
            dockerfile: dockerfile.to_string(),
            t: tag.to_string(),
            rm: true,
            forcerm: true,
            ..Default::default()
        };

        // `build_image` borrows the client, so drive it from a task that owns
        // a clone and forward items to a 'static receiver stream.
        let docker = self.docker.clone();
        let (tx, rx) = futures::channel::mpsc::unbounded();
        tokio::spawn(async move {
            let mut log = docker
                .build_image(options, None, Some(context))
                .flat_map(|item| {
                    let lines = match item {
                        Ok(info) => build_lines(info),
                        Err(e) => vec![Err(Error::Build(e.to_string()))],
                    };
                    stream::iter(lines)
                });
            while let Some(line) = log.next().await {
                if tx.unbounded_send(line).is_err() {
                    break;
                }
            }
        });

        Ok(Box::pin(rx))
    }

    async fn create(
        &self,
        options: &RuntimeOptions,
        tag: &Tag,
        command: &[String],
    ) -> Result<ContainerId> {
        let host_config = HostConfig {
            binds: (!options.volumes.is_empty()).then(|| options.volumes.clone()),
            ..Default::default()
        };

        let config = Config {
            image: Some(tag.to_string()),
            cmd: (!command.is_empty()).then(|| command.to_vec()),
            env: Some(options.env_pairs()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(false),
            host_config: Some(host_config),
            ..Default::default()
        };

        let created = self
            .docker
            .create_container(None::<CreateContainerOptions<String>>, config)
            .await
            .map_err(|e| Error::run(format!("failed to create container: {}", e)))?;
        Ok(ContainerId::new(created.id))
    }

    async fn start(&self, container: &ContainerId) -> Result<RuntimeLog> {
        info!(container = %container, "Starting container");
        self.docker
            .start_container(container.as_str(), None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| Error::Run {
                container: Some(container.clone()),
                message: format!("failed to start container: {}", e),
            })?;

        let options = LogsOptions::<String> {
            follow: true,
            stdout: true,
            stderr: true,
            ..Default::default()
        };

        let log = self
            .docker
            .logs(container.as_str(), Some(options))
            .flat_map(|item| {
                let lines = match item {
                    Ok(output) => output_lines(output),
                    Err(e) => vec![Err(Error::run(format!("log stream failed: {}", e)))],
                };
                stream::iter(lines)
            });

        Ok(Box::pin(log))
    }

    async fn exit_code(&self, container: &ContainerId) -> Result<ExitCode> {
        let options = WaitContainerOptions {
            condition: "not-running",
        };

        let mut waiting = self.docker.wait_container(container.as_str(), Some(options));
        match waiting.next().await {
            Some(Ok(response)) => Ok(ExitCode::new(response.status_code)),
            // bollard reports a nonzero exit as a wait error
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => {
                Ok(ExitCode::new(code))
            }
            Some(Err(e)) => Err(Error::Runtime(format!(
                "failed to wait for container {}: {}",
                container, e
            ))),
            None => Err(Error::Runtime(format!(
                "wait on container {} ended without a status",
                container
            ))),
        }
    }

    async fn remove_container(&self, container: &ContainerId) -> Result<()> {
        debug!(container = %container, "Removing container");
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };

        self.docker
            .remove_container(container.as_str(), Some(options))
            .await
            .map_err(|e| Error::Runtime(format!("failed to remove container: {}", e)))
    }

    async fn remove_image(&self, tag: &Tag) -> Result<()> {
        debug!(tag = %tag, "Removing image");
        let options = RemoveImageOptions {
            force: true,
            ..Default::default()
        };

        self.docker
            .remove_image(tag.as_str(), Some(options), None)
            .await
            .map(|_| ())
            .map_err(|e| Error::Runtime(format!("failed to remove image: {}", e)))
    }

    async fn status(&self) -> Result<()> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| Error::Runtime(format!("docker daemon unavailable: {}", e)))
    }
}

/// Lines carried by one decoded build message. A message with an error
/// fails the build.
fn build_lines(info: BuildInfo) -> Vec<Result<LogLine>> {
    if let Some(error) = info.error {
        return vec![Err(Error::Build(error))];
    }
    info.stream
        .map(|chunk| {
            split_lines(&chunk)
                .into_iter()
                .map(|line| Ok(LogLine::new(line)))
                .collect()
        })
        .unwrap_or_default()
}

/// Lines carried by one demultiplexed stdout/stderr frame.
fn output_lines(output: LogOutput) -> Vec<Result<LogLine>> {
    let message = match output {
        LogOutput::StdOut { message }
        | LogOutput::StdErr { message }
        | LogOutput::Console { message }
        | LogOutput::StdIn { message } => message,
    };
    split_lines(&String::from_utf8_lossy(&message))
        .into_iter()
        .map(|line| Ok(LogLine::new(line)))
        .collect()
}
