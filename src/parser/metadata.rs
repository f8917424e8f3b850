//! Metadata record returned by `--dump-single-json`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A thumbnail candidate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thumbnail {
    pub url: String,
    pub id: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Higher is better.
    pub preference: Option<i64>,
}

/// One downloadable format as described in the metadata document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatInfo {
    pub format_id: String,
    pub ext: Option<String>,
    pub format_note: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<f64>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    pub filesize: Option<u64>,
    pub filesize_approx: Option<u64>,
    pub tbr: Option<f64>,
    pub protocol: Option<String>,
}

impl FormatInfo {
    /// Exact size if known, otherwise the estimate.
    #[must_use]
    pub fn size_hint(&self) -> Option<u64> {
        self.filesize.or(self.filesize_approx)
    }

    /// Returns true if the format has a video stream.
    #[must_use]
    pub fn has_video(&self) -> bool {
        self.vcodec.as_deref().is_some_and(|c| c != "none")
    }

    /// Returns true if the format has an audio stream.
    #[must_use]
    pub fn has_audio(&self) -> bool {
        self.acodec.as_deref().is_some_and(|c| c != "none")
    }
}

/// Video or playlist metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoMetadata {
    pub id: String,
    pub title: String,
    pub uploader: Option<String>,
    pub channel: Option<String>,
    /// Duration in seconds.
    pub duration: Option<f64>,
    pub duration_string: Option<String>,
    pub upload_date: Option<String>,
    pub view_count: Option<u64>,
    pub is_live: Option<bool>,
    pub webpage_url: Option<String>,
    pub extractor: Option<String>,
    pub thumbnail: Option<String>,
    pub thumbnails: Vec<Thumbnail>,
    pub formats: Vec<FormatInfo>,
    /// `playlist` for playlists, `video` or absent for single videos.
    #[serde(rename = "_type")]
    pub kind: Option<String>,
    /// Playlist entries, left unparsed.
    pub entries: Option<Vec<serde_json::Value>>,
}

impl VideoMetadata {
    /// Duration as a `Duration`, if known and non-negative.
    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        self.duration
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(Duration::from_secs_f64)
    }

    /// Returns true if the document describes a playlist.
    #[must_use]
    pub fn is_playlist(&self) -> bool {
        self.kind.as_deref() == Some("playlist") || self.entries.is_some()
    }

    /// Best thumbnail URL: highest preference, then largest area, then the
    /// top-level `thumbnail` field.
    #[must_use]
    pub fn best_thumbnail(&self) -> Option<&str> {
        self.thumbnails
            .iter()
            .filter(|t| !t.url.is_empty())
            .max_by_key(|t| {
                let area = u64::from(t.width.unwrap_or(0)) * u64::from(t.height.unwrap_or(0));
                (t.preference.unwrap_or(i64::MIN), area)
            })
            .map(|t| t.url.as_str())
            .or(self.thumbnail.as_deref())
    }
}

/// Parse the JSON document printed by `--dump-single-json`.
///
/// Leading non-JSON noise (some forks print banners on stdout) is skipped.
///
/// # Errors
///
/// Returns the `serde_json` error if no valid document is found.
pub fn parse_metadata(output: &str) -> Result<VideoMetadata, serde_json::Error> {
    let start = output.find('{').unwrap_or(0);
    serde_json::from_str(output[start..].trim())
}
