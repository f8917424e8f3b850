//! Colored CLI display utilities for download output.

use std::io::{self, Write};
use std::time::Duration;

use chrono::Utc;
use owo_colors::OwoColorize;
use uuid::Uuid;

use crate::parser::{FormatRow, InfoLevel, ProgressEvent, VideoMetadata};
use crate::runner::{JobResult, OutputStream, PoolStats, RunState};

/// Get current timestamp in the same format as tracing.
fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Truncate a string to a maximum number of characters, adding an ellipsis
/// if truncated.
#[must_use]
pub fn truncate(s: &str, max_len: usize, raw_mode: bool) -> String {
    if raw_mode || s.chars().count() <= max_len {
        return s.to_string();
    }
    if max_len <= 3 {
        return "...".to_string();
    }
    let kept: String = s.chars().take(max_len - 3).collect();
    format!("{kept}...")
}

/// First eight characters of a job id.
#[must_use]
pub fn short_id(id: Uuid) -> String {
    id.simple().to_string()[..8].to_string()
}

/// Format an ETA as `H:MM:SS` or `M:SS`; `--:--` when unknown.
#[must_use]
pub fn format_eta(eta: Option<Duration>) -> String {
    let Some(eta) = eta else {
        return "--:--".to_string();
    };
    let secs = eta.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}

/// Format a byte count with binary units.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes}B")
    } else {
        format!("{value:.2}{}", UNITS[unit])
    }
}

/// One-line description of a classified event.
#[must_use]
pub fn describe_event(event: &ProgressEvent, raw_mode: bool) -> String {
    match event {
        ProgressEvent::UrlExtracted { extractor, url } => {
            format!("{extractor}: {}", truncate(url, 80, raw_mode))
        }
        ProgressEvent::WebpageFetching { id, client_type } => match client_type {
            Some(client) => format!("{id}: fetching {client} webpage"),
            None => format!("{id}: fetching webpage"),
        },
        ProgressEvent::ApiJsonFetching { id, client_type } => {
            format!("{id}: fetching {client_type} API JSON")
        }
        ProgressEvent::ManifestFetching { id, manifest } => {
            format!("{id}: fetching {manifest} manifest")
        }
        ProgressEvent::TotalFragments { count } => format!("{count} fragments"),
        ProgressEvent::FormatTesting { format_id } => format!("testing format {format_id}"),
        ProgressEvent::FormatSelected {
            format_id,
            video_id,
        } => format!("{video_id}: format {format_id}"),
        ProgressEvent::ThumbnailFetching { index } => format!("fetching thumbnail {index}"),
        ProgressEvent::ThumbnailWritten { index, path } => {
            format!("thumbnail {index} -> {}", truncate(path, 80, raw_mode))
        }
        ProgressEvent::Destination { path } => format!("-> {}", truncate(path, 100, raw_mode)),
        ProgressEvent::ResumedAtByte { offset } => format!("resuming at {}", format_bytes(*offset)),
        ProgressEvent::AlreadyDownloaded { path } => {
            format!("already downloaded: {}", truncate(path, 100, raw_mode))
        }
        ProgressEvent::DownloadProgress(progress) => {
            let mut line = format!(
                "{:5.1}% of {} at {} ETA {}",
                progress.percent,
                progress.size_text,
                if progress.speed_text.is_empty() {
                    "?"
                } else {
                    progress.speed_text.as_str()
                },
                format_eta(progress.eta)
            );
            if let Some(fragment) = progress.fragment {
                line.push_str(&format!(" (frag {}/{})", fragment.index, fragment.total));
            }
            line
        }
        ProgressEvent::DownloadComplete {
            percent,
            size_text,
        } => format!("{percent:.0}% of {size_text}"),
        ProgressEvent::MergeStarted { output_path } => {
            format!("merging into {}", truncate(output_path, 100, raw_mode))
        }
        ProgressEvent::PostProcessStep {
            processor,
            description,
        } => format!("{processor}: {}", truncate(description, 100, raw_mode)),
        ProgressEvent::PostProcessComplete { summary } => summary.clone(),
        ProgressEvent::SubtitleDownloading { language } => format!("subtitles: {language}"),
        ProgressEvent::Error { message } => truncate(message, 200, raw_mode),
        ProgressEvent::UnclassifiedInfo { raw, .. } => truncate(raw, 150, raw_mode),
    }
}

/// Print a classified event for a job.
pub fn print_event(job: Uuid, event: &ProgressEvent, raw_mode: bool) {
    let id = short_id(job);
    let text = describe_event(event, raw_mode);
    match event {
        ProgressEvent::Error { .. } => {
            println!("{} {} {}", id.dimmed(), "[ERROR]".red().bold(), text.red());
        }
        ProgressEvent::UnclassifiedInfo {
            level: InfoLevel::Warning,
            ..
        } => println!("{} {} {}", id.dimmed(), "[WARN]".yellow().bold(), text),
        ProgressEvent::UnclassifiedInfo { .. } => {
            println!("{} {}", id.dimmed(), text.dimmed());
        }
        ProgressEvent::DownloadProgress(_) => {
            println!("{} {} {}", id.dimmed(), "[DOWNLOAD]".cyan().bold(), text);
        }
        ProgressEvent::DownloadComplete { .. } | ProgressEvent::PostProcessComplete { .. } => {
            println!("{} {} {}", id.dimmed(), "[DONE]".green().bold(), text);
        }
        ProgressEvent::MergeStarted { .. } | ProgressEvent::PostProcessStep { .. } => {
            println!("{} {} {}", id.dimmed(), "[POST]".magenta().bold(), text);
        }
        _ => println!("{} {} {}", id.dimmed(), "[INFO]".blue().bold(), text),
    }
    let _ = io::stdout().flush();
}

/// Print a raw output line (for raw mode).
pub fn print_raw_line(job: Uuid, stream: OutputStream, line: &str) {
    let label = match stream {
        OutputStream::Stdout => "[STDOUT]".dimmed().to_string(),
        OutputStream::Stderr => "[STDERR]".yellow().to_string(),
    };
    println!("{} {} {} {}", timestamp().dimmed(), short_id(job).dimmed(), label, line);
    let _ = io::stdout().flush();
}

/// Print job start information.
pub fn print_job_start(job: Uuid, url: &str, raw_mode: bool) {
    println!(
        "{} {} {} {}",
        timestamp().dimmed(),
        "[JOB]".blue().bold(),
        short_id(job).dimmed(),
        truncate(url, 100, raw_mode).cyan()
    );
    let _ = io::stdout().flush();
}

/// Print the final state of a job.
pub fn print_job_end(job: &JobResult) {
    let ts = timestamp();
    let id = short_id(job.id);
    match &job.result {
        Ok(run) => match &run.state {
            RunState::Completed => println!(
                "{} {} {} completed in {:.1}s",
                ts.dimmed(),
                "[JOB]".green().bold(),
                id.dimmed(),
                run.elapsed.as_secs_f64()
            ),
            RunState::Failed { exit_code, stderr } => {
                println!(
                    "{} {} {} failed (exit code {})",
                    ts.dimmed(),
                    "[JOB]".red().bold(),
                    id.dimmed(),
                    exit_code.map_or_else(|| "none".to_string(), |code| code.to_string())
                );
                if let Some(last) = stderr.lines().last() {
                    println!("{} {}", "[ERROR]".red().bold(), last.red());
                }
            }
            RunState::Cancelled { reason } => println!(
                "{} {} {} {}",
                ts.dimmed(),
                "[JOB]".yellow().bold(),
                id.dimmed(),
                reason
            ),
            other => println!("{} {} {} {other:?}", ts.dimmed(), "[JOB]".bold(), id.dimmed()),
        },
        Err(e) => println!(
            "{} {} {} {}",
            ts.dimmed(),
            "[JOB]".red().bold(),
            id.dimmed(),
            e.to_string().red()
        ),
    }
    let _ = io::stdout().flush();
}

/// Print pool totals.
pub fn print_summary(stats: &PoolStats) {
    println!(
        "{} {} completed={} failed={} cancelled={}",
        timestamp().dimmed(),
        "[SUMMARY]".bold(),
        stats.completed.green(),
        stats.failed.red(),
        stats.cancelled.yellow()
    );
    let _ = io::stdout().flush();
}

/// Print a metadata record.
pub fn print_metadata(meta: &VideoMetadata) {
    println!("{} {}", "[TITLE]".blue().bold(), meta.title.bold());
    println!("{} {}", "[ID]".blue().bold(), meta.id);
    if let Some(uploader) = meta.uploader.as_ref().or(meta.channel.as_ref()) {
        println!("{} {}", "[UPLOADER]".blue().bold(), uploader);
    }
    if let Some(duration) = meta.duration() {
        println!("{} {}", "[DURATION]".blue().bold(), format_eta(Some(duration)));
    }
    if let Some(url) = &meta.webpage_url {
        println!("{} {}", "[URL]".blue().bold(), url.cyan());
    }
    if let Some(thumbnail) = meta.best_thumbnail() {
        println!("{} {}", "[THUMBNAIL]".blue().bold(), thumbnail.dimmed());
    }
    if meta.is_playlist() {
        let count = meta.entries.as_ref().map_or(0, Vec::len);
        println!("{} {count} entries", "[PLAYLIST]".magenta().bold());
    } else {
        println!("{} {}", "[FORMATS]".blue().bold(), meta.formats.len());
    }
    let _ = io::stdout().flush();
}

/// Print a parsed format table.
pub fn print_formats(rows: &[FormatRow]) {
    println!(
        "{}",
        format!(
            "{:<12} {:<6} {:<12} {:>10} {:<10} {:<14} {}",
            "ID", "EXT", "RESOLUTION", "SIZE", "PROTO", "CODECS", "NOTE"
        )
        .bold()
    );
    for row in rows {
        let size = match (&row.filesize_text, row.filesize_approx) {
            (Some(text), true) => format!("~{text}"),
            (Some(text), false) => text.clone(),
            (None, _) => String::new(),
        };
        let codecs = match (&row.vcodec, &row.acodec) {
            (Some(v), Some(a)) => format!("{v}/{a}"),
            (Some(v), None) => v.clone(),
            (None, Some(a)) => a.clone(),
            (None, None) => String::new(),
        };
        let line = format!(
            "{:<12} {:<6} {:<12} {:>10} {:<10} {:<14} {}",
            row.format_id,
            row.ext,
            row.resolution,
            size,
            row.protocol.as_deref().unwrap_or(""),
            truncate(&codecs, 14, false),
            row.note
        );
        if row.is_audio_only() {
            println!("{}", line.green());
        } else {
            println!("{line}");
        }
    }
    let _ = io::stdout().flush();
}

/// Print an error message.
pub fn print_error(message: &str) {
    eprintln!("{} {}", "[ERROR]".red().bold(), message);
}
