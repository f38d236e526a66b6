//! Configuration parsing for the duci CI runner.
//!
//! This crate handles:
//! - Per-repository runtime options (`.duci/config.yml`)
//! - System configuration (`duci.kdl`)
//! - Environment variable expansion applied to both before parsing

pub mod env;
pub mod error;
pub mod runtime;
pub mod system;

pub use env::{expand_env, expand_with};
pub use error::{ConfigError, ConfigResult};
pub use runtime::{
    RUNTIME_CONFIG_PATH, load_runtime_options, parse_runtime_options, parse_runtime_options_with,
};
pub use system::{GitHubConfig, JobConfig, ServerConfig, StoreConfig, SystemConfig};
