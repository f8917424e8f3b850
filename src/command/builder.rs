//! Builder for downloader argument vectors.
//!
//! Setters that need a value reject empty input immediately. Raw custom
//! flags are validated against the allow-list; a rejected custom flag is
//! logged, recorded, and otherwise ignored.

use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::command::flags::{is_flag_like, is_known_flag, split_flag_string, validate_tokens};
use crate::command::CommandError;
use crate::sink::{LogSink, Severity, TracingSink};

/// Format selector used when none is set.
pub const DEFAULT_FORMAT: &str = "best";

/// Output template used when only a folder is set.
pub const DEFAULT_OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";

/// Builder for downloader arguments.
#[derive(Clone)]
pub struct CommandBuilder {
    format: String,
    output_folder: Option<PathBuf>,
    output_template: Option<String>,
    flags: Vec<String>,
    rejections: Vec<CommandError>,
    sink: Arc<dyn LogSink>,
}

impl fmt::Debug for CommandBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandBuilder")
            .field("format", &self.format)
            .field("output_folder", &self.output_folder)
            .field("output_template", &self.output_template)
            .field("flags", &self.flags)
            .field("rejections", &self.rejections)
            .finish_non_exhaustive()
    }
}

impl Default for CommandBuilder {
    fn default() -> Self {
        Self::new(Arc::new(TracingSink))
    }
}

fn require(option: &'static str, value: &str) -> Result<String, CommandError> {
    if value.trim().is_empty() {
        return Err(CommandError::EmptyValue { option });
    }
    if value.contains('\0') {
        return Err(CommandError::InvalidValue {
            option,
            reason: "contains NUL character".to_string(),
        });
    }
    Ok(value.to_string())
}

impl CommandBuilder {
    /// Create a builder reporting rejections to `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self {
            format: DEFAULT_FORMAT.to_string(),
            output_folder: None,
            output_template: None,
            flags: Vec::new(),
            rejections: Vec::new(),
            sink,
        }
    }

    /// Set the format selector (`-f`).
    ///
    /// # Errors
    ///
    /// Returns `CommandError::EmptyValue` if the selector is empty.
    pub fn format(mut self, format: &str) -> Result<Self, CommandError> {
        self.format = require("format", format)?;
        Ok(self)
    }

    /// Set the output folder. Combined with the template into one `-o` value.
    ///
    /// # Errors
    ///
    /// Returns `CommandError::EmptyValue` if the folder is empty.
    pub fn output_folder(mut self, folder: impl AsRef<Path>) -> Result<Self, CommandError> {
        let folder = folder.as_ref();
        require("output folder", &folder.to_string_lossy())?;
        self.output_folder = Some(folder.to_path_buf());
        Ok(self)
    }

    /// Set the output template. Passed through verbatim.
    ///
    /// # Errors
    ///
    /// Returns `CommandError::EmptyValue` if the template is empty.
    pub fn output_template(mut self, template: &str) -> Result<Self, CommandError> {
        self.output_template = Some(require("output template", template)?);
        Ok(self)
    }

    /// Append a single known flag.
    ///
    /// # Errors
    ///
    /// Returns `CommandError::InvalidOption` if the flag is not on the
    /// allow-list.
    pub fn add_flag(mut self, flag: &str) -> Result<Self, CommandError> {
        let flag = require("flag", flag)?;
        if !is_flag_like(&flag) || !is_known_flag(&flag) {
            return Err(CommandError::InvalidOption { flag });
        }
        self.flags.push(flag);
        Ok(self)
    }

    /// Append a known flag followed by its value.
    ///
    /// # Errors
    ///
    /// Returns an error if the flag is unknown or the value is empty.
    pub fn add_flag_value(self, flag: &str, value: &str) -> Result<Self, CommandError> {
        let value = require("flag value", value)?;
        let mut builder = self.add_flag(flag)?;
        builder.flags.push(value);
        Ok(builder)
    }

    /// Append a raw flag string such as `--limit-rate 50K --no-mtime`.
    ///
    /// Every flag-like token must be on the allow-list. If any token is
    /// rejected, nothing is appended; the rejection is logged and kept in
    /// [`rejections`](Self::rejections).
    #[must_use]
    pub fn add_custom_flag(mut self, raw: &str) -> Self {
        let result = split_flag_string(raw).and_then(|tokens| {
            validate_tokens(&tokens)?;
            Ok(tokens)
        });

        match result {
            Ok(tokens) => self.flags.extend(tokens),
            Err(e) => {
                self.sink
                    .log(Severity::Error, &format!("Rejected custom flag {raw:?}: {e}"));
                self.rejections.push(e);
            }
        }
        self
    }

    /// Route traffic through a proxy.
    ///
    /// # Errors
    ///
    /// Returns `CommandError::EmptyValue` if the URL is empty.
    pub fn proxy(self, url: &str) -> Result<Self, CommandError> {
        self.add_flag_value("--proxy", url)
    }

    /// Socket timeout, rounded up to whole seconds.
    ///
    /// # Errors
    ///
    /// Returns `CommandError::InvalidValue` for a zero timeout.
    pub fn socket_timeout(self, timeout: Duration) -> Result<Self, CommandError> {
        if timeout.is_zero() {
            return Err(CommandError::InvalidValue {
                option: "socket timeout",
                reason: "must be greater than zero".to_string(),
            });
        }
        let secs = timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0);
        self.add_flag_value("--socket-timeout", &secs.to_string())
    }

    /// Retry count for whole requests.
    #[must_use]
    pub fn retries(mut self, count: u32) -> Self {
        self.flags.push("--retries".to_string());
        self.flags.push(count.to_string());
        self
    }

    /// Retry count for individual fragments.
    #[must_use]
    pub fn fragment_retries(mut self, count: u32) -> Self {
        self.flags.push("--fragment-retries".to_string());
        self.flags.push(count.to_string());
        self
    }

    /// Limit download rate (e.g. `50K`, `4.2M`).
    ///
    /// # Errors
    ///
    /// Returns `CommandError::EmptyValue` if the rate is empty.
    pub fn rate_limit(self, rate: &str) -> Result<Self, CommandError> {
        self.add_flag_value("--limit-rate", rate)
    }

    /// Number of fragments fetched in parallel.
    ///
    /// # Errors
    ///
    /// Returns `CommandError::InvalidValue` for zero.
    pub fn concurrent_fragments(self, count: u32) -> Result<Self, CommandError> {
        if count == 0 {
            return Err(CommandError::InvalidValue {
                option: "concurrent fragments",
                reason: "must be at least 1".to_string(),
            });
        }
        self.add_flag_value("--concurrent-fragments", &count.to_string())
    }

    /// Override the HTTP user agent.
    ///
    /// # Errors
    ///
    /// Returns `CommandError::EmptyValue` if the agent is empty.
    pub fn user_agent(self, agent: &str) -> Result<Self, CommandError> {
        self.add_flag_value("--user-agent", agent)
    }

    /// Connect over IPv4 only.
    #[must_use]
    pub fn force_ipv4(mut self) -> Self {
        self.flags.push("--force-ipv4".to_string());
        self
    }

    /// Download only the video when the URL also names a playlist.
    #[must_use]
    pub fn no_playlist(mut self) -> Self {
        self.flags.push("--no-playlist".to_string());
        self
    }

    /// Read cookies from a Netscape-format file.
    ///
    /// # Errors
    ///
    /// Returns `CommandError::EmptyValue` if the path is empty.
    pub fn cookies_file(self, path: impl AsRef<Path>) -> Result<Self, CommandError> {
        self.add_flag_value("--cookies", &path.as_ref().to_string_lossy())
    }

    /// Read cookies from an installed browser.
    ///
    /// # Errors
    ///
    /// Returns `CommandError::EmptyValue` if the browser name is empty.
    pub fn cookies_from_browser(self, browser: &str) -> Result<Self, CommandError> {
        self.add_flag_value("--cookies-from-browser", browser)
    }

    /// Log in with a username and password.
    ///
    /// # Errors
    ///
    /// Returns `CommandError::EmptyValue` if either value is empty.
    pub fn credentials(self, username: &str, password: &str) -> Result<Self, CommandError> {
        self.add_flag_value("--username", username)?
            .add_flag_value("--password", password)
    }

    /// Download subtitles for the given languages.
    ///
    /// # Errors
    ///
    /// Returns `CommandError::EmptyValue` if no language is given.
    pub fn subtitles(self, languages: &[&str]) -> Result<Self, CommandError> {
        let languages: Vec<&str> = languages
            .iter()
            .map(|lang| lang.trim())
            .filter(|lang| !lang.is_empty())
            .collect();
        if languages.is_empty() {
            return Err(CommandError::EmptyValue {
                option: "subtitle languages",
            });
        }
        self.add_flag("--write-subs")?
            .add_flag_value("--sub-langs", &languages.join(","))
    }

    /// Also fetch automatically generated subtitles.
    #[must_use]
    pub fn auto_subtitles(mut self) -> Self {
        self.flags.push("--write-auto-subs".to_string());
        self
    }

    /// Embed subtitles into the output container.
    #[must_use]
    pub fn embed_subtitles(mut self) -> Self {
        self.flags.push("--embed-subs".to_string());
        self
    }

    /// Write the thumbnail next to the output file.
    #[must_use]
    pub fn write_thumbnail(mut self) -> Self {
        self.flags.push("--write-thumbnail".to_string());
        self
    }

    /// Embed the thumbnail into the output file.
    #[must_use]
    pub fn embed_thumbnail(mut self) -> Self {
        self.flags.push("--embed-thumbnail".to_string());
        self
    }

    /// Extract audio into the given format (`mp3`, `m4a`, `best`, ...).
    ///
    /// # Errors
    ///
    /// Returns `CommandError::EmptyValue` if the format is empty.
    pub fn extract_audio(self, audio_format: &str) -> Result<Self, CommandError> {
        self.add_flag("--extract-audio")?
            .add_flag_value("--audio-format", audio_format)
    }

    /// Container used when merging separate streams.
    ///
    /// # Errors
    ///
    /// Returns `CommandError::EmptyValue` if the container is empty.
    pub fn merge_output_format(self, container: &str) -> Result<Self, CommandError> {
        self.add_flag_value("--merge-output-format", container)
    }

    /// Format selector.
    #[must_use]
    pub fn get_format(&self) -> &str {
        &self.format
    }

    /// Output folder, if set.
    #[must_use]
    pub fn get_output_folder(&self) -> Option<&Path> {
        self.output_folder.as_deref()
    }

    /// Flags accumulated since the last `build`.
    #[must_use]
    pub fn pending_flags(&self) -> &[String] {
        &self.flags
    }

    /// Custom flags rejected since the last `build`.
    #[must_use]
    pub fn rejections(&self) -> &[CommandError] {
        &self.rejections
    }

    /// Take the recorded rejections, leaving none behind.
    pub fn take_rejections(&mut self) -> Vec<CommandError> {
        std::mem::take(&mut self.rejections)
    }

    /// The `-o` value: folder and template joined with `/`.
    #[must_use]
    pub fn output_path(&self) -> Option<String> {
        match (&self.output_folder, &self.output_template) {
            (None, None) => None,
            (None, Some(template)) => Some(template.clone()),
            (Some(folder), template) => {
                let folder = folder.to_string_lossy().replace('\\', "/");
                let template = template.as_deref().unwrap_or(DEFAULT_OUTPUT_TEMPLATE);
                Some(format!("{}/{template}", folder.trim_end_matches('/')))
            }
        }
    }

    /// Build the argument vector for `url`.
    ///
    /// Produces `-f <format> [-o <path>] --newline <flags...> -- <url>`.
    /// Accumulated flags and rejections are cleared; format, folder and
    /// template are kept.
    ///
    /// # Errors
    ///
    /// Returns `CommandError::EmptyUrl` for an empty URL.
    pub fn build(&mut self, url: &str) -> Result<Vec<String>, CommandError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(CommandError::EmptyUrl);
        }
        let url = require("url", url)?;

        let mut args = vec!["-f".to_string(), self.format.clone()];
        if let Some(path) = self.output_path() {
            args.push("-o".to_string());
            args.push(path);
        }
        args.push("--newline".to_string());
        args.append(&mut self.flags);
        args.push("--".to_string());
        args.push(url);

        self.rejections.clear();
        Ok(args)
    }
}

/// Render an argument vector as a single shell-escaped command line.
///
/// For logging and display; processes are spawned from the vector directly.
#[must_use]
pub fn to_command_line(executable: &str, args: &[String]) -> String {
    std::iter::once(executable)
        .chain(args.iter().map(String::as_str))
        .map(|arg| shell_escape::escape(Cow::Borrowed(arg)).into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}
