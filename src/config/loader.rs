//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::schema::{ConfigDocument, SiteDescriptor};

/// File name looked up when `--config` points at a directory.
pub const DEFAULT_CONFIG_FILE: &str = "server-config.json";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("config {path} declares no sites")]
    Empty { path: PathBuf },
}

/// Resolve the config path: a directory means `<dir>/server-config.json`.
pub fn resolve_config_path(path: &Path) -> PathBuf {
    if path.is_dir() {
        path.join(DEFAULT_CONFIG_FILE)
    } else {
        path.to_path_buf()
    }
}

/// Load the site descriptors from a JSON file.
pub fn load_config(path: &Path) -> Result<Vec<SiteDescriptor>, ConfigError> {
    let path = resolve_config_path(path);
    let content = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    let sites = parse_config(&content).map_err(|source| ConfigError::Parse {
        path: path.clone(),
        source,
    })?;

    if sites.is_empty() {
        return Err(ConfigError::Empty { path });
    }
    Ok(sites)
}

/// Parse a config document held in memory.
pub fn parse_config(content: &str) -> Result<Vec<SiteDescriptor>, serde_json::Error> {
    let doc: ConfigDocument = serde_json::from_str(content)?;
    Ok(doc.into_sites())
}
