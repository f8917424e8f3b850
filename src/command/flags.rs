//! Validation of raw, user-supplied downloader flags.
//!
//! Custom flags go through a strict allow-list. Flags that run arbitrary
//! programs (`--exec`, `--ffmpeg-location`, `--postprocessor-args`), load
//! other configuration (`--config-locations`, `--plugin-dirs`, `--batch-file`)
//! or override what the builder manages (`-f`, `-o`, `-P`) are not on it.

/// Error type for command construction.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// A required value was empty.
    #[error("Empty value for {option}")]
    EmptyValue { option: &'static str },

    /// A value was present but unusable.
    #[error("Invalid value for {option}: {reason}")]
    InvalidValue {
        option: &'static str,
        reason: String,
    },

    /// A flag is not on the allow-list.
    #[error("Invalid option: {flag}")]
    InvalidOption { flag: String },

    /// No target URL was given.
    #[error("URL must not be empty")]
    EmptyUrl,
}

/// Flags accepted by `add_flag` and `add_custom_flag`.
pub const KNOWN_FLAGS: &[&str] = &[
    // General
    "-i",
    "--ignore-errors",
    "--no-abort-on-error",
    "--abort-on-error",
    "--ignore-config",
    "--flat-playlist",
    "--no-flat-playlist",
    "--live-from-start",
    "--no-live-from-start",
    "--wait-for-video",
    "--no-wait-for-video",
    "--mark-watched",
    "--no-mark-watched",
    "--no-color",
    "--compat-options",
    // Network
    "--proxy",
    "--socket-timeout",
    "--source-address",
    "-4",
    "-6",
    "--force-ipv4",
    "--force-ipv6",
    // Geo restriction
    "--geo-verification-proxy",
    "--xff",
    // Video selection
    "-I",
    "--playlist-items",
    "--min-filesize",
    "--max-filesize",
    "--date",
    "--datebefore",
    "--dateafter",
    "--match-filters",
    "--no-match-filters",
    "--break-match-filters",
    "--no-playlist",
    "--yes-playlist",
    "--age-limit",
    "--download-archive",
    "--no-download-archive",
    "--max-downloads",
    "--break-on-existing",
    "--break-per-input",
    "--skip-playlist-after-errors",
    // Download
    "-N",
    "--concurrent-fragments",
    "-r",
    "--limit-rate",
    "--throttled-rate",
    "-R",
    "--retries",
    "--file-access-retries",
    "--fragment-retries",
    "--retry-sleep",
    "--skip-unavailable-fragments",
    "--no-skip-unavailable-fragments",
    "--abort-on-unavailable-fragments",
    "--keep-fragments",
    "--no-keep-fragments",
    "--buffer-size",
    "--resize-buffer",
    "--no-resize-buffer",
    "--http-chunk-size",
    "--playlist-random",
    "--lazy-playlist",
    "--no-lazy-playlist",
    "--hls-use-mpegts",
    "--no-hls-use-mpegts",
    "--hls-prefer-native",
    "--download-sections",
    // Filesystem
    "-w",
    "--no-overwrites",
    "--force-overwrites",
    "--no-force-overwrites",
    "-c",
    "--continue",
    "--no-continue",
    "--part",
    "--no-part",
    "--mtime",
    "--no-mtime",
    "--restrict-filenames",
    "--no-restrict-filenames",
    "--windows-filenames",
    "--no-windows-filenames",
    "--trim-filenames",
    "--write-description",
    "--no-write-description",
    "--write-info-json",
    "--no-write-info-json",
    "--write-playlist-metafiles",
    "--no-write-playlist-metafiles",
    "--cookies",
    "--no-cookies",
    "--cookies-from-browser",
    "--no-cookies-from-browser",
    "--no-cache-dir",
    // Thumbnails
    "--write-thumbnail",
    "--no-write-thumbnail",
    "--write-all-thumbnails",
    "--convert-thumbnails",
    // Verbosity
    "-q",
    "--quiet",
    "--no-quiet",
    "--no-warnings",
    "-s",
    "--simulate",
    "--no-simulate",
    "--skip-download",
    "--newline",
    "--no-progress",
    "--progress",
    "--console-title",
    "-v",
    "--verbose",
    // Workarounds
    "--encoding",
    "--no-check-certificates",
    "--prefer-insecure",
    "--add-headers",
    "--user-agent",
    "--referer",
    "--sleep-requests",
    "--sleep-interval",
    "--min-sleep-interval",
    "--max-sleep-interval",
    "--sleep-subtitles",
    "--legacy-server-connect",
    // Format selection
    "-S",
    "--format-sort",
    "--format-sort-force",
    "--no-format-sort-force",
    "--video-multistreams",
    "--no-video-multistreams",
    "--audio-multistreams",
    "--no-audio-multistreams",
    "--prefer-free-formats",
    "--no-prefer-free-formats",
    "--check-formats",
    "--check-all-formats",
    "--no-check-formats",
    "--merge-output-format",
    // Subtitles
    "--write-subs",
    "--no-write-subs",
    "--write-auto-subs",
    "--no-write-auto-subs",
    "--sub-format",
    "--sub-langs",
    // Authentication
    "-u",
    "--username",
    "-p",
    "--password",
    "-2",
    "--twofactor",
    "-n",
    "--netrc",
    "--video-password",
    "--ap-mso",
    "--ap-username",
    "--ap-password",
    // Post-processing
    "-x",
    "--extract-audio",
    "--audio-format",
    "--audio-quality",
    "--remux-video",
    "--recode-video",
    "-k",
    "--keep-video",
    "--no-keep-video",
    "--post-overwrites",
    "--no-post-overwrites",
    "--embed-subs",
    "--no-embed-subs",
    "--embed-thumbnail",
    "--no-embed-thumbnail",
    "--embed-metadata",
    "--add-metadata",
    "--no-embed-metadata",
    "--embed-chapters",
    "--no-embed-chapters",
    "--embed-info-json",
    "--no-embed-info-json",
    "--parse-metadata",
    "--replace-in-metadata",
    "--xattrs",
    "--concat-playlist",
    "--fixup",
    "--convert-subs",
    "--split-chapters",
    "--no-split-chapters",
    "--remove-chapters",
    "--no-remove-chapters",
    "--force-keyframes-at-cuts",
    "--no-force-keyframes-at-cuts",
    "--sponsorblock-mark",
    "--sponsorblock-remove",
    "--no-sponsorblock",
    // Extractor
    "--extractor-retries",
    "--extractor-args",
    "--allow-dynamic-mpd",
    "--ignore-dynamic-mpd",
];

/// Returns true if `token` should be validated as a flag.
///
/// Negative numbers (`-1`, `-0.5`) are values, not flags.
#[must_use]
pub fn is_flag_like(token: &str) -> bool {
    match token.strip_prefix('-') {
        Some(rest) => !rest.is_empty() && rest.parse::<f64>().is_err(),
        None => false,
    }
}

/// Returns true if the flag (optionally in `--flag=value` form) is on the
/// allow-list.
#[must_use]
pub fn is_known_flag(token: &str) -> bool {
    let name = token.split_once('=').map_or(token, |(name, _)| name);
    KNOWN_FLAGS.contains(&name)
}

/// Split a raw flag string into tokens, honouring single and double quotes.
///
/// # Errors
///
/// Returns `CommandError::InvalidValue` on an unterminated quote or a NUL
/// character.
pub fn split_flag_string(raw: &str) -> Result<Vec<String>, CommandError> {
    if raw.contains('\0') {
        return Err(CommandError::InvalidValue {
            option: "custom flag",
            reason: "contains NUL character".to_string(),
        });
    }

    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;

    for c in raw.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_token = true;
            }
            None if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            None => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if quote.is_some() {
        return Err(CommandError::InvalidValue {
            option: "custom flag",
            reason: "unterminated quote".to_string(),
        });
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

/// Check every flag-like token against the allow-list.
///
/// # Errors
///
/// Returns `CommandError::InvalidOption` naming the first unknown flag.
pub fn validate_tokens(tokens: &[String]) -> Result<(), CommandError> {
    match tokens
        .iter()
        .find(|token| is_flag_like(token) && !is_known_flag(token))
    {
        Some(flag) => Err(CommandError::InvalidOption { flag: flag.clone() }),
        None => Ok(()),
    }
}
