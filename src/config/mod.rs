// src/config/mod.rs
mod models;

pub use models::*;

use anyhow::{Context, Result};
use std::path::Path;
use tracing::warn;

/// Load configuration from a file (YAML or JSON)
pub async fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file {}", path.display()))?;

    let config = parse_config(path, &contents)?;
    config.validate()?;
    Ok(config)
}

/// Like [`load_config`], but a missing or broken file yields the defaults
/// (no backends) instead of an error.
pub async fn load_config_or_default<P: AsRef<Path>>(path: P) -> Config {
    match load_config(path.as_ref()).await {
        Ok(config) => config,
        Err(e) => {
            warn!(
                path = %path.as_ref().display(),
                error = format!("{:#}", e),
                "Failed to load configuration, starting with an empty backend list"
            );
            Config::default()
        }
    }
}

fn parse_config(path: &Path, contents: &str) -> Result<Config> {
    let ext = path.extension().and_then(|s| s.to_str());
    let config = if matches!(ext, Some("yaml") | Some("yml")) {
        serde_yaml::from_str(contents).context("Failed to parse YAML config")?
    } else {
        serde_json::from_str(contents).context("Failed to parse JSON config")?
    };
    Ok(config)
}
