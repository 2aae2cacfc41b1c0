//! YAML configuration for the lifecycle driver.
//!
//! Loaded once at startup from `--config-file` or `/etc/postbranch/config.yml`
//! and validated before anything else (the catalog, ZFS, the control API)
//! gets a chance to run.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use validator::Validate;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/postbranch/config.yml";
const DEFAULT_CATALOG_PATH: &str = "/var/lib/postbranch/catalog.db";
const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1";
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Read { path: PathBuf, #[source] source: std::io::Error },
    #[error("could not parse config file {path}: {source}")]
    Parse { path: PathBuf, #[source] source: serde_yaml::Error },
    #[error("invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Config {
    #[serde(default)]
    #[validate(nested)]
    pub server: ServerConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ServerConfig {
    #[validate(range(min = 1, max = 65535))]
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: default_port(), bind_address: default_bind_address() }
    }
}

fn default_port() -> u16 {
    8443
}

fn default_bind_address() -> String {
    DEFAULT_BIND_ADDRESS.to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_catalog_path")]
    pub path: PathBuf,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self { path: default_catalog_path() }
    }
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from(DEFAULT_CATALOG_PATH)
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        let config: Config = serde_yaml::from_str(&contents)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_an_empty_document() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.server.port, 8443);
        assert_eq!(config.server.bind_address, "127.0.0.1");
        assert_eq!(config.catalog.path, PathBuf::from(DEFAULT_CATALOG_PATH));
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn out_of_range_port_fails_validation() {
        let config: Config = serde_yaml::from_str("server:\n  port: 0\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_is_reported() {
        let err = Config::load(Path::new("/nonexistent/postbranch/config.yml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
