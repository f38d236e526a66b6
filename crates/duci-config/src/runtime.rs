//! Runtime options read from a repository's `.duci/config.yml`.
//!
//! ```yaml
//! environments:
//!   CI: true
//!   CACHE_DIR: ${HOME}/.cache
//! volumes:
//!   - '${HOME}/.m2:/root/.m2'
//! ```

use crate::{ConfigError, ConfigResult, expand_env, expand_with};
use duci_core::RuntimeOptions;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Location of the runtime options file, relative to the working directory.
pub const RUNTIME_CONFIG_PATH: &str = ".duci/config.yml";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawRuntimeConfig {
    #[serde(alias = "environment")]
    environments: Option<BTreeMap<String, serde_yaml::Value>>,
    volumes: Option<Vec<String>>,
}

/// Load runtime options for `workdir`.
///
/// A missing file yields the default options. Environment variables in the
/// file are expanded before it is decoded.
pub fn load_runtime_options(workdir: &Path) -> ConfigResult<RuntimeOptions> {
    let path = workdir.join(RUNTIME_CONFIG_PATH);
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No runtime options file");
            return Ok(RuntimeOptions::default());
        }
        Err(e) => return Err(e.into()),
    };
    parse_runtime_options(&expand_env(&raw))
}

/// Expand variables with `lookup`, then parse.
pub fn parse_runtime_options_with<F>(raw: &str, lookup: F) -> ConfigResult<RuntimeOptions>
where
    F: Fn(&str) -> Option<String>,
{
    parse_runtime_options(&expand_with(raw, lookup))
}

/// Parse already-expanded YAML text.
pub fn parse_runtime_options(yaml: &str) -> ConfigResult<RuntimeOptions> {
    if yaml.trim().is_empty() {
        return Ok(RuntimeOptions::default());
    }

    let raw: RawRuntimeConfig = serde_yaml::from_str(yaml)?;

    let mut environment = BTreeMap::new();
    for (key, value) in raw.environments.unwrap_or_default() {
        let value = scalar_to_string(&key, value)?;
        environment.insert(key, value);
    }

    Ok(RuntimeOptions {
        environment,
        volumes: raw.volumes.unwrap_or_default(),
    })
}

fn scalar_to_string(key: &str, value: serde_yaml::Value) -> ConfigResult<String> {
    match value {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        serde_yaml::Value::Null => Ok(String::new()),
        _ => Err(ConfigError::InvalidValue {
            field: format!("environments.{}", key),
            message: "expected a scalar value".to_string(),
        }),
    }
}
