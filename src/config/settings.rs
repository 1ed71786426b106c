//! Configuration settings and validation.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Main configuration for a monitoring session.
#[derive(Debug, Clone)]
pub struct Config {
    /// Absolute root of the monitored directory tree.
    pub root: PathBuf,

    /// Absolute directory paths exempt from discovery and watching.
    ///
    /// Matching is by exact path, not by prefix: excluding `/data/private`
    /// does not exclude `/data/private/nested`.
    pub exclude: Vec<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

/// Optional values read from a TOML configuration file.
///
/// Every field is optional so the file can supply just the pieces the
/// command line leaves out; command-line values win on conflict.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub root: Option<PathBuf>,
    #[serde(default)]
    pub exclude: Vec<PathBuf>,
    pub log_level: Option<String>,
}

impl FileConfig {
    /// Load a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("cannot read config file '{}': {e}", path.display()))
        })?;

        toml::from_str(&raw).map_err(|e| {
            Error::config(format!(
                "cannot parse config file '{}': {e}",
                path.display()
            ))
        })
    }
}

impl Config {
    /// Merge command-line values over file values into a validated config.
    ///
    /// # Errors
    ///
    /// Returns an error if no root is supplied anywhere or if any value
    /// fails validation.
    pub fn resolve(
        file: Option<FileConfig>,
        root: Option<PathBuf>,
        exclude: Vec<PathBuf>,
        log_level: Option<String>,
    ) -> Result<Self> {
        let file = file.unwrap_or_default();

        let root = root
            .or(file.root)
            .ok_or_else(|| Error::config("no watched root given (argument or config file)"))?;

        let exclude = if exclude.is_empty() {
            file.exclude
        } else {
            exclude
        };

        let log_level = log_level
            .or(file.log_level)
            .unwrap_or_else(|| "info".to_string());

        let config = Self {
            root,
            exclude,
            log_level,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        if !self.root.is_absolute() {
            return Err(Error::config(format!(
                "watched root '{}' must be an absolute path",
                self.root.display()
            )));
        }

        for path in &self.exclude {
            if !path.is_absolute() {
                return Err(Error::config(format!(
                    "excluded path '{}' must be absolute",
                    path.display()
                )));
            }
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(Error::config(format!(
                "invalid log level '{}', must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            )));
        }

        Ok(())
    }
}
