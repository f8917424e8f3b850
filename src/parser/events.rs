//! Event types produced from downloader output.
//!
//! Every stdout line the downloader prints is turned into exactly one
//! [`ProgressEvent`]. Lines that match no known shape still produce an
//! event ([`ProgressEvent::UnclassifiedInfo`] or [`ProgressEvent::Error`]).

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Fragment position inside a segmented (HLS/DASH) download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    /// Current fragment, 1-based as printed by the downloader.
    pub index: u32,
    /// Total fragments announced for the stream.
    pub total: u32,
}

impl Fragment {
    /// Returns true if fragments remain after this one.
    #[must_use]
    pub fn is_outstanding(&self) -> bool {
        self.index < self.total
    }
}

/// Progress report for an in-flight download.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadProgress {
    /// Percentage in `0.0..=100.0`.
    pub percent: f64,
    /// Total size as printed (e.g. `"~ 343.72MiB"` becomes `"343.72MiB"`).
    pub size_text: String,
    /// Speed as printed (e.g. `"420.30KiB/s"`), empty when absent.
    pub speed_text: String,
    /// Estimated time remaining, if the downloader knows it.
    pub eta: Option<Duration>,
    /// Fragment position for segmented downloads.
    pub fragment: Option<Fragment>,
}

/// Flavor of a line no pattern recognised.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InfoLevel {
    #[default]
    Info,
    Warning,
}

/// Events emitted for downloader stdout lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Extractor started working on a URL.
    UrlExtracted {
        /// Extractor name (e.g. `youtube`).
        extractor: String,
        url: String,
    },
    /// Extractor is fetching the video webpage.
    WebpageFetching {
        id: String,
        /// Client flavor, when the line names one.
        client_type: Option<String>,
    },
    /// Extractor is fetching a player API JSON document.
    ApiJsonFetching { id: String, client_type: String },
    /// Extractor is fetching a streaming manifest.
    ManifestFetching {
        id: String,
        /// Manifest kind as printed (`m3u8`, `MPD`, ...).
        manifest: String,
    },
    /// Segmented download announced its fragment count.
    TotalFragments { count: u32 },
    /// Format availability probe.
    FormatTesting { format_id: String },
    /// Final format chosen for a video.
    FormatSelected { format_id: String, video_id: String },
    /// Thumbnail download started.
    ThumbnailFetching { index: u32 },
    /// Thumbnail written to disk.
    ThumbnailWritten { index: u32, path: String },
    /// Output file path for the current stream.
    Destination { path: String },
    /// Partial file found; download resumes.
    ResumedAtByte { offset: u64 },
    /// File already exists; nothing to download.
    AlreadyDownloaded { path: String },
    /// In-flight progress.
    DownloadProgress(DownloadProgress),
    /// Stream fully downloaded. Raised at most once per run.
    DownloadComplete { percent: f64, size_text: String },
    /// Separate streams are being merged.
    MergeStarted { output_path: String },
    /// One post-processing action.
    PostProcessStep {
        /// Post-processor tag, or `cleanup` for deletions.
        processor: String,
        description: String,
    },
    /// Post-processing finished. Raised once per merge episode.
    PostProcessComplete { summary: String },
    /// Subtitle track download.
    SubtitleDownloading { language: String },
    /// Error reported by the downloader.
    Error { message: String },
    /// Line that matched no pattern.
    UnclassifiedInfo { raw: String, level: InfoLevel },
}

impl ProgressEvent {
    /// Returns true for `Error` events.
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Returns true for `DownloadComplete` events.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::DownloadComplete { .. })
    }

    /// Returns the percentage carried by progress-like events.
    #[must_use]
    pub fn percent(&self) -> Option<f64> {
        match self {
            Self::DownloadProgress(progress) => Some(progress.percent),
            Self::DownloadComplete { percent, .. } => Some(*percent),
            _ => None,
        }
    }

    /// Short name of the variant, used in logs and display.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::UrlExtracted { .. } => "url_extracted",
            Self::WebpageFetching { .. } => "webpage_fetching",
            Self::ApiJsonFetching { .. } => "api_json_fetching",
            Self::ManifestFetching { .. } => "manifest_fetching",
            Self::TotalFragments { .. } => "total_fragments",
            Self::FormatTesting { .. } => "format_testing",
            Self::FormatSelected { .. } => "format_selected",
            Self::ThumbnailFetching { .. } => "thumbnail_fetching",
            Self::ThumbnailWritten { .. } => "thumbnail_written",
            Self::Destination { .. } => "destination",
            Self::ResumedAtByte { .. } => "resumed_at_byte",
            Self::AlreadyDownloaded { .. } => "already_downloaded",
            Self::DownloadProgress(_) => "download_progress",
            Self::DownloadComplete { .. } => "download_complete",
            Self::MergeStarted { .. } => "merge_started",
            Self::PostProcessStep { .. } => "post_process_step",
            Self::PostProcessComplete { .. } => "post_process_complete",
            Self::SubtitleDownloading { .. } => "subtitle_downloading",
            Self::Error { .. } => "error",
            Self::UnclassifiedInfo { .. } => "unclassified_info",
        }
    }
}
