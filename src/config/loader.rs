//! Locating and reading the driver's TOML configuration.

use std::path::{Path, PathBuf};

use crate::config::DriverConfig;

/// File name looked up in the current directory.
pub const LOCAL_CONFIG_FILE: &str = ".ytdlp-driver.toml";

/// Environment variable naming a config file to try before the defaults.
pub const CONFIG_ENV: &str = "YTDLP_DRIVER_CONFIG";

/// Finds the first existing config file among a list of candidates.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    candidates: Vec<PathBuf>,
}

impl ConfigLoader {
    /// Candidates, highest priority first: `$YTDLP_DRIVER_CONFIG`,
    /// `./.ytdlp-driver.toml`, then `<config_dir>/ytdlp-driver/config.toml`.
    #[must_use]
    pub fn new() -> Self {
        let from_env = std::env::var_os(CONFIG_ENV)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);
        let user = dirs::config_dir().map(|dir| dir.join("ytdlp-driver").join("config.toml"));

        let candidates = from_env
            .into_iter()
            .chain(std::iter::once(PathBuf::from(LOCAL_CONFIG_FILE)))
            .chain(user)
            .collect();
        Self { candidates }
    }

    /// Loader that only considers `path`.
    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            candidates: vec![path],
        }
    }

    /// Candidate paths in lookup order.
    #[must_use]
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.candidates
    }

    /// First candidate that exists on disk.
    #[must_use]
    pub fn find_config_file(&self) -> Option<PathBuf> {
        self.candidates.iter().find(|path| path.is_file()).cloned()
    }

    /// Load the first existing candidate, or defaults when there is none.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the chosen file is unreadable, malformed or
    /// fails validation.
    pub fn load(&self) -> Result<DriverConfig, ConfigError> {
        match self.find_config_file() {
            Some(path) => Self::load_file(&path),
            None => {
                tracing::debug!(candidates = self.candidates.len(), "No config file, using defaults");
                Ok(DriverConfig::default())
            }
        }
    }

    /// Load `path`, which must exist.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file is unreadable, malformed or fails
    /// validation.
    pub fn load_file(path: &Path) -> Result<DriverConfig, ConfigError> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let config: DriverConfig =
            toml::from_str(&text).map_err(|source| ConfigError::ParseError {
                path: path.to_path_buf(),
                source,
            })?;
        validate(&config).map_err(|reason| ConfigError::Invalid {
            path: path.to_path_buf(),
            reason,
        })?;
        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Reject values that parse but cannot drive a download.
fn validate(config: &DriverConfig) -> Result<(), String> {
    if config.max_concurrent == 0 {
        return Err("max_concurrent must be at least 1".to_string());
    }
    if config
        .executable
        .as_ref()
        .is_some_and(|path| path.as_os_str().is_empty())
    {
        return Err("executable must not be empty".to_string());
    }
    if config.post_process.min_steps == 0 && config.post_process.min_deletions == 0 {
        return Err("post_process thresholds cannot both be zero".to_string());
    }
    Ok(())
}

/// Errors that can occur during configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", .path.display())]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}: {source}", .path.display())]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid config file {}: {reason}", .path.display())]
    Invalid { path: PathBuf, reason: String },
}
