//! Configuration management for the query cache
//!
//! This module provides the TOML configuration file model. The `[cache]`
//! table maps onto [`CacheConfig`]; the `[logging]` table drives the tracing
//! subscriber installed by the simulation binary.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::app::CacheConfig;
use crate::constants::{config, logging};
use crate::errors::{ConfigError, ConfigResult};

/// Unified application configuration for TOML serialization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Cache store settings
    pub cache: CacheConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level for this crate
    pub level: String,
    /// Include the event target in log lines
    pub show_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: logging::DEFAULT_LEVEL.to_string(),
            show_target: false,
        }
    }
}

impl LoggingConfig {
    /// Filter directive for `tracing_subscriber::EnvFilter`
    pub fn filter_directive(&self) -> String {
        format!("{}={}", logging::TARGET, self.level)
    }
}

impl AppConfig {
    /// Runtime cache configuration
    pub fn to_runtime_config(&self) -> CacheConfig {
        self.cache
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as TOML
    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load configuration
    ///
    /// An explicit path must exist. Without one, `query-cache.toml` in the
    /// working directory is used when present, otherwise defaults apply.
    pub async fn load(config_file_override: Option<PathBuf>) -> ConfigResult<Self> {
        let path = match config_file_override {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound { path });
                }
                path
            }
            None => {
                let path = PathBuf::from(config::DEFAULT_FILE_NAME);
                if !path.exists() {
                    debug!("No config file found, using defaults");
                    return Ok(Self::default());
                }
                path
            }
        };

        Self::load_from_file(&path).await
    }

    /// Load configuration from a TOML file
    pub async fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();

        let level = self.logging.level.to_ascii_lowercase();
        if !logging::VALID_LEVELS.contains(&level.as_str()) {
            errors.push(format!(
                "logging.level must be one of {:?}, got '{}'",
                logging::VALID_LEVELS,
                self.logging.level
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::ValidationFailed { errors })
        }
    }
}
