//! Ordered pattern table for downloader output lines.
//!
//! Rules are tried top to bottom and the first match wins, so specific
//! shapes (fragmented progress, the 100% summary line) sit above the general
//! ones they would otherwise be mistaken for.

use regex::{Captures, Regex};

/// Post-processor tags, as an alternation for the post-processing rules.
const POST_PROCESSORS: &str = r"Merger|ExtractAudio|EmbedThumbnail|EmbedSubtitle|Metadata|FFmpegMetadata|Fixup\w*|VideoConvertor|VideoRemuxer|MoveFiles|ModifyChapters|SponsorBlock|SplitChapters|ThumbnailsConvertor|SubtitlesConvertor|Exec";

/// Semantic meaning of a recognised line shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineKind {
    UrlExtracted,
    WebpageFetching,
    ApiJsonFetching,
    ManifestFetching,
    TotalFragments,
    FormatTesting,
    FormatSelected,
    ThumbnailFetching,
    ThumbnailWritten,
    SubtitleLanguage,
    SubtitleWritten,
    Destination,
    ResumedAtByte,
    AlreadyDownloaded,
    FragmentProgress,
    CompleteSummary,
    Progress,
    MergeStarted,
    FileDeletion,
    PostProcessSuccess,
    PostProcessStep,
    ErrorToken,
}

/// Error type for pattern table operations.
#[derive(thiserror::Error, Debug)]
pub enum PatternError {
    /// Invalid regex pattern.
    #[error("Invalid regex pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// A single rule binding a compiled pattern to a line kind.
#[derive(Debug, Clone)]
pub struct LineRule {
    kind: LineKind,
    pattern: Regex,
}

impl LineRule {
    /// Create a new rule.
    ///
    /// # Errors
    ///
    /// Returns `PatternError::InvalidPattern` if the regex is invalid.
    pub fn new(kind: LineKind, pattern: &str) -> Result<Self, PatternError> {
        Ok(Self {
            kind,
            pattern: Regex::new(pattern)?,
        })
    }

    /// Match the line against this rule, returning captures on success.
    #[must_use]
    pub fn captures<'a>(&self, line: &'a str) -> Option<Captures<'a>> {
        self.pattern.captures(line)
    }

    /// Get the line kind.
    #[must_use]
    pub fn kind(&self) -> LineKind {
        self.kind
    }

    /// Get the pattern string (for debugging/display).
    #[must_use]
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }
}

/// An ordered collection of line rules.
#[derive(Debug, Clone, Default)]
pub struct PatternTable {
    rules: Vec<LineRule>,
}

impl PatternTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Create a table with every known yt-dlp line shape.
    #[must_use]
    pub fn with_default_rules() -> Self {
        let rules = Self::default_rules()
            .into_iter()
            .filter_map(|result| match result {
                Ok(rule) => Some(rule),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to compile default line rule");
                    None
                }
            })
            .collect();
        Self { rules }
    }

    /// Append a rule at the lowest priority.
    pub fn add_rule(&mut self, rule: LineRule) {
        self.rules.push(rule);
    }

    /// Insert a rule at `index`, shifting lower-priority rules down.
    ///
    /// Indices past the end append.
    pub fn insert_rule(&mut self, index: usize, rule: LineRule) {
        let index = index.min(self.rules.len());
        self.rules.insert(index, rule);
    }

    /// Position of the first rule with the given kind.
    #[must_use]
    pub fn position(&self, kind: LineKind) -> Option<usize> {
        self.rules.iter().position(|rule| rule.kind == kind)
    }

    /// Find the first rule matching the line.
    #[must_use]
    pub fn find<'a>(&self, line: &'a str) -> Option<(LineKind, Captures<'a>)> {
        self.rules
            .iter()
            .find_map(|rule| rule.captures(line).map(|caps| (rule.kind, caps)))
    }

    /// Get all rules in priority order.
    #[must_use]
    pub fn rules(&self) -> &[LineRule] {
        &self.rules
    }

    /// Get the number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Check if the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn default_rules() -> Vec<Result<LineRule, PatternError>> {
        vec![
            LineRule::new(
                LineKind::UrlExtracted,
                r"^\[(?P<extractor>[^\]]+)\]\s+Extracting URL:\s+(?P<url>\S+)",
            ),
            LineRule::new(
                LineKind::WebpageFetching,
                r"^\[[^\]]+\]\s+(?P<id>[^:\s]+):\s+Downloading\s+(?:(?P<client>[\w ]+?)\s+)?webpage\b",
            ),
            LineRule::new(
                LineKind::ApiJsonFetching,
                r"^\[[^\]]+\]\s+(?P<id>[^:\s]+):\s+Downloading\s+(?P<client>[\w ]+?)\s+(?:player\s+)?API JSON",
            ),
            LineRule::new(
                LineKind::ManifestFetching,
                r"^\[[^\]]+\]\s+(?P<id>[^:\s]+):\s+Downloading\s+(?:(?P<manifest>\w+)\s+)?(?:information|manifest)\b",
            ),
            LineRule::new(
                LineKind::TotalFragments,
                r"^\[(?:hlsnative|dashsegments|download)\]\s+Total fragments:\s+(?P<count>\d+)",
            ),
            LineRule::new(
                LineKind::FormatTesting,
                r"^\[info\]\s+Testing format\s+(?P<format>\S+)",
            ),
            LineRule::new(
                LineKind::FormatSelected,
                r"^\[info\]\s+(?P<id>[^:\s]+):\s+Downloading\s+(?:\d+\s+)?format\(s\):\s+(?P<format>\S+)",
            ),
            LineRule::new(
                LineKind::ThumbnailFetching,
                r"^\[info\]\s+Downloading video thumbnail\s+(?P<index>\d+)",
            ),
            LineRule::new(
                LineKind::ThumbnailWritten,
                r"^\[info\]\s+Writing video thumbnail\s+(?P<index>\d+)\s+to:\s+(?P<path>.+)$",
            ),
            LineRule::new(
                LineKind::SubtitleLanguage,
                r"^\[info\]\s+Downloading subtitles:\s+(?P<lang>.+)$",
            ),
            LineRule::new(
                LineKind::SubtitleWritten,
                r"^\[info\]\s+Writing video subtitles to:\s+(?P<path>.+?)\.(?P<lang>[\w-]+)\.\w+$",
            ),
            LineRule::new(
                LineKind::Destination,
                r"^\[download\]\s+Destination:\s+(?P<path>.+)$",
            ),
            LineRule::new(
                LineKind::ResumedAtByte,
                r"^\[download\]\s+Resuming download at byte\s+(?P<offset>\d+)",
            ),
            LineRule::new(
                LineKind::AlreadyDownloaded,
                r"^\[download\]\s+(?P<path>.+?)\s+has already been downloaded",
            ),
            LineRule::new(
                LineKind::FragmentProgress,
                r"^\[download\]\s+(?P<percent>\d+(?:\.\d+)?)%\s+of\s+~?\s*(?P<size>\S+)\s+at\s+(?P<speed>.+?)\s+ETA\s+(?P<eta>\S+)\s+\(frag\s+(?P<frag>\d+)/(?P<total>\d+)\)",
            ),
            LineRule::new(
                LineKind::CompleteSummary,
                r"^\[download\]\s+100(?:\.0+)?%\s+of\s+~?\s*(?P<size>\S+)\s+in\s+(?P<elapsed>\S+)",
            ),
            LineRule::new(
                LineKind::Progress,
                r"^\[download\]\s+(?P<percent>\d+(?:\.\d+)?)%\s+of\s+~?\s*(?P<size>\S+)(?:\s+at\s+(?P<speed>.+?))?(?:\s+ETA\s+(?P<eta>\S+))?(?:\s+\(frag\s+(?P<frag>\d+)/(?P<total>\d+)\))?\s*$",
            ),
            LineRule::new(
                LineKind::MergeStarted,
                r#"^\[Merger\]\s+Merging formats into\s+"?(?P<path>[^"]+)"?$"#,
            ),
            LineRule::new(
                LineKind::FileDeletion,
                r"Deleting original file\s+(?P<path>.+?)(?:\s+\(pass -k to keep\))?$",
            ),
            LineRule::new(
                LineKind::PostProcessSuccess,
                &format!(r"^\[(?P<processor>{POST_PROCESSORS})\]\s+(?P<desc>.*\b(?i:successfully)\b.*)$"),
            ),
            LineRule::new(
                LineKind::PostProcessStep,
                &format!(r"^\[(?P<processor>{POST_PROCESSORS})\]\s+(?P<desc>.+)$"),
            ),
            LineRule::new(LineKind::ErrorToken, r"^ERROR:\s*(?P<message>.*)$"),
        ]
    }
}
