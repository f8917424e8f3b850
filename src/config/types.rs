//! Configuration types.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::command::{CommandBuilder, CommandError};
use crate::parser::PostProcessThresholds;
use crate::runner::DEFAULT_MAX_CONCURRENT;
use crate::sink::NullSink;

/// Environment variable consulted when no executable is configured.
pub const EXECUTABLE_ENV: &str = "YTDLP_PATH";

/// Executable used when neither config nor environment names one.
pub const DEFAULT_EXECUTABLE: &str = "yt-dlp";

/// Top-level driver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Path to the downloader executable.
    pub executable: Option<PathBuf>,
    /// Downloads run at once.
    pub max_concurrent: usize,
    /// Per-download time limit in seconds.
    pub timeout_secs: Option<u64>,
    /// Default output folder.
    pub output_folder: Option<PathBuf>,
    pub command: CommandConfig,
    pub network: NetworkConfig,
    pub post_process: PostProcessThresholds,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            executable: None,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            timeout_secs: None,
            output_folder: None,
            command: CommandConfig::default(),
            network: NetworkConfig::default(),
            post_process: PostProcessThresholds::default(),
        }
    }
}

impl DriverConfig {
    /// Resolve the executable: config, then `YTDLP_PATH`, then `yt-dlp`.
    #[must_use]
    pub fn executable_path(&self) -> PathBuf {
        self.executable
            .clone()
            .or_else(|| std::env::var_os(EXECUTABLE_ENV).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_EXECUTABLE))
    }

    /// Per-download time limit, if any. Zero means none.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Apply the `[command]` and `[network]` sections and the default
    /// output folder to `builder`.
    ///
    /// # Errors
    ///
    /// Returns `CommandError` if a configured value is rejected.
    pub fn apply(&self, mut builder: CommandBuilder) -> Result<CommandBuilder, CommandError> {
        if let Some(folder) = &self.output_folder {
            builder = builder.output_folder(folder)?;
        }
        builder = self.command.apply(builder)?;
        self.network.apply(builder)
    }

    /// Network options as plain arguments, for single-shot queries.
    ///
    /// # Errors
    ///
    /// Returns `CommandError` if a configured value is rejected.
    pub fn network_args(&self) -> Result<Vec<String>, CommandError> {
        let builder = self.network.apply(CommandBuilder::new(Arc::new(NullSink)))?;
        Ok(builder.pending_flags().to_vec())
    }
}

/// `[command]` section: what to download and how to name it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    pub format: Option<String>,
    pub output_template: Option<String>,
    pub no_playlist: bool,
    pub merge_output_format: Option<String>,
    pub subtitle_languages: Vec<String>,
    pub embed_subtitles: bool,
    pub embed_thumbnail: bool,
    /// Raw flag strings, validated like `--flag` on the command line.
    pub extra_flags: Vec<String>,
}

impl CommandConfig {
    /// Apply this section to `builder`.
    ///
    /// # Errors
    ///
    /// Returns `CommandError` if a configured value is rejected.
    pub fn apply(&self, mut builder: CommandBuilder) -> Result<CommandBuilder, CommandError> {
        if let Some(format) = &self.format {
            builder = builder.format(format)?;
        }
        if let Some(template) = &self.output_template {
            builder = builder.output_template(template)?;
        }
        if self.no_playlist {
            builder = builder.no_playlist();
        }
        if let Some(container) = &self.merge_output_format {
            builder = builder.merge_output_format(container)?;
        }
        if !self.subtitle_languages.is_empty() {
            let languages: Vec<&str> = self.subtitle_languages.iter().map(String::as_str).collect();
            builder = builder.subtitles(&languages)?;
        }
        if self.embed_subtitles {
            builder = builder.embed_subtitles();
        }
        if self.embed_thumbnail {
            builder = builder.embed_thumbnail();
        }
        for raw in &self.extra_flags {
            builder = builder.add_custom_flag(raw);
        }
        Ok(builder)
    }
}

/// `[network]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub proxy: Option<String>,
    pub retries: Option<u32>,
    pub fragment_retries: Option<u32>,
    pub socket_timeout_secs: Option<u64>,
    pub rate_limit: Option<String>,
    pub concurrent_fragments: Option<u32>,
    pub user_agent: Option<String>,
    pub force_ipv4: bool,
    pub cookies_file: Option<PathBuf>,
    pub cookies_from_browser: Option<String>,
}

impl NetworkConfig {
    /// Apply this section to `builder`.
    ///
    /// # Errors
    ///
    /// Returns `CommandError` if a configured value is rejected.
    pub fn apply(&self, mut builder: CommandBuilder) -> Result<CommandBuilder, CommandError> {
        if let Some(proxy) = &self.proxy {
            builder = builder.proxy(proxy)?;
        }
        if let Some(retries) = self.retries {
            builder = builder.retries(retries);
        }
        if let Some(retries) = self.fragment_retries {
            builder = builder.fragment_retries(retries);
        }
        if let Some(secs) = self.socket_timeout_secs {
            builder = builder.socket_timeout(Duration::from_secs(secs))?;
        }
        if let Some(rate) = &self.rate_limit {
            builder = builder.rate_limit(rate)?;
        }
        if let Some(count) = self.concurrent_fragments {
            builder = builder.concurrent_fragments(count)?;
        }
        if let Some(agent) = &self.user_agent {
            builder = builder.user_agent(agent)?;
        }
        if self.force_ipv4 {
            builder = builder.force_ipv4();
        }
        if let Some(path) = &self.cookies_file {
            builder = builder.cookies_file(path)?;
        }
        if let Some(browser) = &self.cookies_from_browser {
            builder = builder.cookies_from_browser(browser)?;
        }
        Ok(builder)
    }
}
