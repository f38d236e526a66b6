//! System configuration parsing (`duci.kdl`).
//!
//! ```kdl
//! server {
//!     listen "0.0.0.0:8080"
//!     base-url "http://ci.example.com"
//! }
//! job {
//!     concurrency 4
//!     timeout-secs 600
//!     cleanup-images #false
//!     reap-abandoned #true
//! }
//! store {
//!     url "sqlite://duci.db"
//! }
//! github {
//!     token "${GITHUB_API_TOKEN}"
//!     context "duci"
//! }
//! ```

use crate::{ConfigError, ConfigResult, expand_env};
use kdl::{KdlDocument, KdlNode, KdlValue};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// System-wide configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemConfig {
    pub server: ServerConfig,
    pub job: JobConfig,
    pub store: StoreConfig,
    pub github: GitHubConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub listen: String,
    /// Public URL used to build log links for status reports.
    pub base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
            base_url: "http://localhost:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Builds allowed to run at once, process-wide.
    pub concurrency: usize,
    pub timeout: Duration,
    /// Remove each run's image after the container is removed.
    pub cleanup_images: bool,
    /// Abort and reap runs whose deadline passed instead of leaving them detached.
    pub reap_abandoned: bool,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            timeout: Duration::from_secs(600),
            cleanup_images: false,
            reap_abandoned: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://duci.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubConfig {
    pub token: Option<String>,
    pub context: String,
    pub api_url: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            context: "duci".to_string(),
            api_url: "https://api.github.com".to_string(),
        }
    }
}

impl SystemConfig {
    /// Read, expand and parse a configuration file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        parse_system_config(&expand_env(&raw))
    }
}

/// Parse system configuration from KDL text.
pub fn parse_system_config(kdl: &str) -> ConfigResult<SystemConfig> {
    let doc: KdlDocument = kdl.parse()?;
    let mut config = SystemConfig::default();

    for node in doc.nodes() {
        match node.name().value() {
            "server" => parse_server(node, &mut config.server)?,
            "job" => parse_job(node, &mut config.job)?,
            "store" => {
                for child in children(node) {
                    if child.name().value() == "url" {
                        config.store.url = required_string(child, "store.url")?;
                    }
                }
            }
            "github" => parse_github(node, &mut config.github)?,
            _ => {} // Ignore unknown nodes
        }
    }

    Ok(config)
}

fn parse_server(node: &KdlNode, server: &mut ServerConfig) -> ConfigResult<()> {
    for child in children(node) {
        match child.name().value() {
            "listen" => server.listen = required_string(child, "server.listen")?,
            "base-url" => {
                server.base_url = required_string(child, "server.base-url")?
                    .trim_end_matches('/')
                    .to_string()
            }
            _ => {}
        }
    }
    Ok(())
}

fn parse_job(node: &KdlNode, job: &mut JobConfig) -> ConfigResult<()> {
    for child in children(node) {
        match child.name().value() {
            "concurrency" => {
                let n = required_integer(child, "job.concurrency")?;
                if n < 1 {
                    return Err(ConfigError::InvalidValue {
                        field: "job.concurrency".to_string(),
                        message: "must be at least 1".to_string(),
                    });
                }
                job.concurrency = n as usize;
            }
            "timeout-secs" => {
                let secs = required_integer(child, "job.timeout-secs")?;
                if secs < 1 {
                    return Err(ConfigError::InvalidValue {
                        field: "job.timeout-secs".to_string(),
                        message: "must be at least 1".to_string(),
                    });
                }
                job.timeout = Duration::from_secs(secs as u64);
            }
            "cleanup-images" => job.cleanup_images = required_bool(child, "job.cleanup-images")?,
            "reap-abandoned" => job.reap_abandoned = required_bool(child, "job.reap-abandoned")?,
            _ => {}
        }
    }
    Ok(())
}

fn parse_github(node: &KdlNode, github: &mut GitHubConfig) -> ConfigResult<()> {
    for child in children(node) {
        match child.name().value() {
            "token" => {
                let token = required_string(child, "github.token")?;
                github.token = (!token.is_empty()).then_some(token);
            }
            "context" => github.context = required_string(child, "github.context")?,
            "api-url" => {
                github.api_url = required_string(child, "github.api-url")?
                    .trim_end_matches('/')
                    .to_string()
            }
            _ => {}
        }
    }
    Ok(())
}

// Helper functions for extracting values from KDL nodes

fn children(node: &KdlNode) -> impl Iterator<Item = &KdlNode> {
    node.children().into_iter().flat_map(|doc| doc.nodes())
}

fn first_arg(node: &KdlNode) -> Option<&KdlValue> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .map(|e| e.value())
}

fn required_string(node: &KdlNode, field: &str) -> ConfigResult<String> {
    match first_arg(node) {
        Some(value) => value
            .as_string()
            .map(|s| s.to_string())
            .ok_or_else(|| invalid(field, "expected a string")),
        None => Err(ConfigError::MissingField(field.to_string())),
    }
}

fn required_integer(node: &KdlNode, field: &str) -> ConfigResult<i128> {
    match first_arg(node) {
        Some(value) => value
            .as_integer()
            .ok_or_else(|| invalid(field, "expected an integer")),
        None => Err(ConfigError::MissingField(field.to_string())),
    }
}

fn required_bool(node: &KdlNode, field: &str) -> ConfigResult<bool> {
    match first_arg(node) {
        Some(value) => value
            .as_bool()
            .ok_or_else(|| invalid(field, "expected a boolean")),
        None => Err(ConfigError::MissingField(field.to_string())),
    }
}

fn invalid(field: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
}
