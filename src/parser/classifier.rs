//! Line classifier: turns downloader stdout lines into progress events.
//!
//! One classifier belongs to one run. Lines are classified strictly in arrival
//! order and each line yields exactly one [`ProgressEvent`]. Call
//! [`LineClassifier::reset`] before reusing an instance for another run.

use std::fmt;
use std::sync::Arc;

use regex::Captures;
use serde::{Deserialize, Serialize};

use crate::parser::numeric::{parse_eta, parse_percent, parse_u32_or_zero, parse_u64_or_zero};
use crate::parser::{
    DownloadProgress, Fragment, InfoLevel, LineKind, PatternTable, ProgressEvent,
};
use crate::sink::{LogSink, Severity, TracingSink};

/// Thresholds for deciding when post-processing has finished.
///
/// The downloader never prints one canonical "done" line after merging, so
/// completion is inferred from how many post-processing lines were seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostProcessThresholds {
    /// Post-processing lines (steps and deletions) that end an episode.
    pub min_steps: u32,
    /// Deletion lines that end an episode.
    pub min_deletions: u32,
}

impl Default for PostProcessThresholds {
    fn default() -> Self {
        Self {
            min_steps: 2,
            min_deletions: 2,
        }
    }
}

/// Per-run classifier state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParserState {
    /// Latched once a completion has been raised for this run.
    pub download_completed: bool,
    /// A merge episode is in progress.
    pub is_merging: bool,
    /// Post-processing lines seen in the current episode.
    pub post_process_steps: u32,
    /// Deletion lines seen in the current episode.
    pub deletions: u32,
    /// The current episode already raised `PostProcessComplete`.
    pub post_process_done: bool,
    /// Last fragment count announced by the downloader.
    pub total_fragments: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PostProcessLine {
    Step,
    Deletion,
    Success,
}

/// Stateful classifier for downloader output.
pub struct LineClassifier {
    table: PatternTable,
    thresholds: PostProcessThresholds,
    state: ParserState,
    sink: Arc<dyn LogSink>,
}

impl fmt::Debug for LineClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineClassifier")
            .field("rules", &self.table.len())
            .field("thresholds", &self.thresholds)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Default for LineClassifier {
    fn default() -> Self {
        Self::new(Arc::new(TracingSink))
    }
}

impl LineClassifier {
    /// Create a classifier with the default pattern table.
    #[must_use]
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self {
            table: PatternTable::with_default_rules(),
            thresholds: PostProcessThresholds::default(),
            state: ParserState::default(),
            sink,
        }
    }

    /// Replace the pattern table.
    #[must_use]
    pub fn with_table(mut self, table: PatternTable) -> Self {
        self.table = table;
        self
    }

    /// Set the post-processing thresholds.
    #[must_use]
    pub fn with_thresholds(mut self, thresholds: PostProcessThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Current state, for inspection.
    #[must_use]
    pub fn state(&self) -> &ParserState {
        &self.state
    }

    /// Post-processing thresholds in use.
    #[must_use]
    pub fn thresholds(&self) -> PostProcessThresholds {
        self.thresholds
    }

    /// Clear all per-run state.
    pub fn reset(&mut self) {
        self.state = ParserState::default();
        self.sink.log(Severity::Debug, "Classifier state reset");
    }

    /// Classify one stdout line.
    ///
    /// Never fails: lines matching no rule become `UnclassifiedInfo`, or
    /// `Error` when they carry an error marker.
    pub fn classify(&mut self, line: &str) -> ProgressEvent {
        // Without --newline the downloader rewrites one line with carriage
        // returns; only the last segment is current.
        let line = line
            .split('\r')
            .rfind(|segment| !segment.trim().is_empty())
            .unwrap_or("")
            .trim();

        match self.table.find(line) {
            Some((kind, caps)) => self.dispatch(kind, &caps),
            None => self.classify_unmatched(line),
        }
    }

    fn dispatch(&mut self, kind: LineKind, caps: &Captures<'_>) -> ProgressEvent {
        match kind {
            LineKind::UrlExtracted => ProgressEvent::UrlExtracted {
                extractor: text(caps, "extractor"),
                url: text(caps, "url"),
            },
            LineKind::WebpageFetching => ProgressEvent::WebpageFetching {
                id: text(caps, "id"),
                client_type: optional(caps, "client"),
            },
            LineKind::ApiJsonFetching => ProgressEvent::ApiJsonFetching {
                id: text(caps, "id"),
                client_type: text(caps, "client"),
            },
            LineKind::ManifestFetching => ProgressEvent::ManifestFetching {
                id: text(caps, "id"),
                manifest: optional(caps, "manifest").unwrap_or_else(|| "manifest".to_string()),
            },
            LineKind::TotalFragments => {
                let count = parse_u32_or_zero(&text(caps, "count"));
                self.state.total_fragments = Some(count);
                ProgressEvent::TotalFragments { count }
            }
            LineKind::FormatTesting => ProgressEvent::FormatTesting {
                format_id: text(caps, "format"),
            },
            LineKind::FormatSelected => ProgressEvent::FormatSelected {
                format_id: text(caps, "format"),
                video_id: text(caps, "id"),
            },
            LineKind::ThumbnailFetching => ProgressEvent::ThumbnailFetching {
                index: parse_u32_or_zero(&text(caps, "index")),
            },
            LineKind::ThumbnailWritten => ProgressEvent::ThumbnailWritten {
                index: parse_u32_or_zero(&text(caps, "index")),
                path: text(caps, "path"),
            },
            LineKind::SubtitleLanguage | LineKind::SubtitleWritten => {
                ProgressEvent::SubtitleDownloading {
                    language: text(caps, "lang"),
                }
            }
            LineKind::Destination => {
                self.begin_download();
                ProgressEvent::Destination {
                    path: text(caps, "path"),
                }
            }
            LineKind::ResumedAtByte => ProgressEvent::ResumedAtByte {
                offset: parse_u64_or_zero(&text(caps, "offset")),
            },
            LineKind::AlreadyDownloaded => ProgressEvent::AlreadyDownloaded {
                path: text(caps, "path"),
            },
            LineKind::FragmentProgress | LineKind::Progress => self.handle_progress(caps),
            LineKind::CompleteSummary => {
                let progress = DownloadProgress {
                    percent: 100.0,
                    size_text: text(caps, "size"),
                    speed_text: String::new(),
                    eta: None,
                    fragment: None,
                };
                self.handle_completion(progress)
            }
            LineKind::MergeStarted => {
                self.state.is_merging = true;
                self.state.post_process_steps = 0;
                self.state.deletions = 0;
                self.state.post_process_done = false;
                ProgressEvent::MergeStarted {
                    output_path: text(caps, "path"),
                }
            }
            LineKind::FileDeletion => self.handle_post_process(
                PostProcessLine::Deletion,
                "cleanup".to_string(),
                format!("Deleted {}", text(caps, "path")),
            ),
            LineKind::PostProcessSuccess => self.handle_post_process(
                PostProcessLine::Success,
                text(caps, "processor"),
                text(caps, "desc"),
            ),
            LineKind::PostProcessStep => self.handle_post_process(
                PostProcessLine::Step,
                text(caps, "processor"),
                text(caps, "desc"),
            ),
            LineKind::ErrorToken => {
                let message = text(caps, "message");
                self.sink.log(Severity::Error, &message);
                ProgressEvent::Error { message }
            }
        }
    }

    fn handle_progress(&mut self, caps: &Captures<'_>) -> ProgressEvent {
        let fragment = match (caps.name("frag"), caps.name("total")) {
            (Some(index), Some(total)) => {
                let total = parse_u32_or_zero(total.as_str());
                (total > 0).then(|| Fragment {
                    index: parse_u32_or_zero(index.as_str()),
                    total,
                })
            }
            _ => None,
        };

        let progress = DownloadProgress {
            percent: parse_percent(&text(caps, "percent")),
            size_text: text(caps, "size"),
            speed_text: optional(caps, "speed").unwrap_or_default(),
            eta: caps.name("eta").and_then(|m| parse_eta(m.as_str())),
            fragment,
        };

        if progress.percent < 100.0 {
            self.begin_download();
            return ProgressEvent::DownloadProgress(progress);
        }

        if let Some(fragment) = fragment.filter(Fragment::is_outstanding) {
            self.sink.log(
                Severity::Debug,
                &format!(
                    "100% reported with fragments outstanding ({}/{}), not completing",
                    fragment.index, fragment.total
                ),
            );
            return ProgressEvent::DownloadProgress(progress);
        }

        self.handle_completion(progress)
    }

    /// A new file is being fetched, so any later post-processing belongs to
    /// a new episode.
    fn begin_download(&mut self) {
        self.state.is_merging = false;
        self.state.post_process_steps = 0;
        self.state.deletions = 0;
        self.state.post_process_done = false;
    }

    fn handle_completion(&mut self, progress: DownloadProgress) -> ProgressEvent {
        if self.state.download_completed {
            self.sink
                .log(Severity::Debug, "Repeated completion line ignored for this run");
            return ProgressEvent::DownloadProgress(progress);
        }

        self.state.download_completed = true;
        self.sink.log(
            Severity::Info,
            &format!("Download complete ({})", progress.size_text),
        );
        ProgressEvent::DownloadComplete {
            percent: progress.percent,
            size_text: progress.size_text,
        }
    }

    fn handle_post_process(
        &mut self,
        line: PostProcessLine,
        processor: String,
        description: String,
    ) -> ProgressEvent {
        if self.state.post_process_done {
            return ProgressEvent::PostProcessStep {
                processor,
                description,
            };
        }

        match line {
            PostProcessLine::Step => {
                self.state.post_process_steps = self.state.post_process_steps.saturating_add(1);
            }
            PostProcessLine::Deletion => {
                self.state.post_process_steps = self.state.post_process_steps.saturating_add(1);
                self.state.deletions = self.state.deletions.saturating_add(1);
            }
            PostProcessLine::Success => {}
        }

        let min_steps = self.thresholds.min_steps.max(1);
        let min_deletions = self.thresholds.min_deletions.max(1);
        let finished = line == PostProcessLine::Success
            || self.state.post_process_steps >= min_steps
            || self.state.deletions >= min_deletions;

        if !finished {
            return ProgressEvent::PostProcessStep {
                processor,
                description,
            };
        }

        let summary = if line == PostProcessLine::Success {
            format!("{processor}: {description}")
        } else {
            format!(
                "{} post-processing step(s), {} file(s) cleaned up",
                self.state.post_process_steps, self.state.deletions
            )
        };

        self.state.is_merging = false;
        self.state.post_process_steps = 0;
        self.state.deletions = 0;
        self.state.post_process_done = true;
        self.sink.log(Severity::Info, &summary);

        ProgressEvent::PostProcessComplete { summary }
    }

    fn classify_unmatched(&self, line: &str) -> ProgressEvent {
        let lower = line.to_ascii_lowercase();
        if lower.contains("error") {
            self.sink.log(Severity::Error, line);
            return ProgressEvent::Error {
                message: line.to_string(),
            };
        }

        let level = if lower.contains("warning") {
            self.sink.log(Severity::Warning, line);
            InfoLevel::Warning
        } else {
            self.sink.log(Severity::Debug, line);
            InfoLevel::Info
        };

        ProgressEvent::UnclassifiedInfo {
            raw: line.to_string(),
            level,
        }
    }
}

fn text(caps: &Captures<'_>, name: &str) -> String {
    caps.name(name)
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

fn optional(caps: &Captures<'_>, name: &str) -> Option<String> {
    caps.name(name)
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}
