//! CLI command implementations.

pub mod logs;
pub mod run;

use anyhow::{Context, Result};
use duci_config::{RUNTIME_CONFIG_PATH, SystemConfig, load_runtime_options};
use duci_executor::dockerfile_path;
use std::path::Path;

pub async fn health(server: &str) -> Result<()> {
    let url = format!("{}/health", server.trim_end_matches('/'));
    let response = reqwest::get(&url)
        .await
        .with_context(|| format!("Failed to reach {}", url))?;

    let status = response.status();
    let body: serde_json::Value = response.json().await.context("Invalid health response")?;

    if status.is_success() {
        println!(
            "ok: runtime {} ({} running, capacity {})",
            body["runtime"], body["running"], body["capacity"]
        );
        Ok(())
    } else {
        println!("unhealthy: {}", body["error"]);
        std::process::exit(1);
    }
}

pub fn validate(config: &Path, workdir: Option<&Path>) -> Result<()> {
    let mut valid = true;

    if config.exists() {
        match SystemConfig::load(config) {
            Ok(system) => {
                println!("{}: valid", config.display());
                println!("  listen:      {}", system.server.listen);
                println!("  concurrency: {}", system.job.concurrency);
                println!("  timeout:     {:?}", system.job.timeout);
                println!("  store:       {}", system.store.url);
                println!(
                    "  github:      {}",
                    if system.github.token.is_some() { "enabled" } else { "disabled" }
                );
            }
            Err(e) => {
                println!("{}: {}", config.display(), e);
                valid = false;
            }
        }
    } else {
        println!("{}: not found, defaults apply", config.display());
    }

    if let Some(workdir) = workdir {
        println!("{}: dockerfile {}", workdir.display(), dockerfile_path(workdir));
        match load_runtime_options(workdir) {
            Ok(options) => {
                println!("{}: valid", workdir.join(RUNTIME_CONFIG_PATH).display());
                println!("  environment: {} variables", options.environment.len());
                for volume in &options.volumes {
                    println!("  volume:      {}", volume);
                }
            }
            Err(e) => {
                println!("{}: {}", workdir.join(RUNTIME_CONFIG_PATH).display(), e);
                valid = false;
            }
        }
    }

    if !valid {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_defaults_and_runtime_options() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(".duci")).unwrap();
        std::fs::write(
            dir.path().join(RUNTIME_CONFIG_PATH),
            "volumes:\n  - /cache:/cache\n",
        )
        .unwrap();

        let missing = dir.path().join("duci.kdl");
        assert!(validate(&missing, Some(dir.path())).is_ok());
    }

    #[test]
    fn test_validate_reads_system_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("duci.kdl");
        std::fs::write(&config, "job {\n    concurrency 2\n}\n").unwrap();

        assert!(validate(&config, None).is_ok());
    }
}
