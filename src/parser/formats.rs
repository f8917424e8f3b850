//! Parser for the format table printed by `-F` / `--list-formats`.
//!
//! Two layouts are understood. The current one splits each row into three
//! `│`-separated sections with optional FPS, channel and filesize columns:
//!
//! ```text
//! ID  EXT   RESOLUTION FPS CH │   FILESIZE   TBR PROTO │ VCODEC          VBR ACODEC      ABR ASR MORE INFO
//! 139 m4a   audio only      2 │    1.26MiB   49k https │ audio only          mp4a.40.5   49k 22k low, m4a_dash
//! ```
//!
//! The legacy layout is whitespace separated: `format code  extension  resolution note`.

use serde::{Deserialize, Serialize};

use crate::parser::numeric::{parse_size_bytes, strip_approx};

/// One row of the format table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormatRow {
    pub format_id: String,
    pub ext: String,
    /// `WIDTHxHEIGHT`, `audio only`, or whatever the tool printed.
    pub resolution: String,
    pub fps: Option<f64>,
    pub channels: Option<u32>,
    /// Size as printed, without the approximate marker.
    pub filesize_text: Option<String>,
    pub filesize_bytes: Option<u64>,
    /// Size is an estimate (`~` or `≈`).
    pub filesize_approx: bool,
    /// Total bitrate as printed (e.g. `3495k`).
    pub tbr: Option<String>,
    pub protocol: Option<String>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    /// Free-form trailing column.
    pub note: String,
}

impl FormatRow {
    /// Returns true if the row carries no video stream.
    #[must_use]
    pub fn is_audio_only(&self) -> bool {
        self.resolution == "audio only" || self.vcodec.as_deref() == Some("audio only")
    }

    /// Returns true if the row carries no audio stream.
    #[must_use]
    pub fn is_video_only(&self) -> bool {
        self.acodec.as_deref() == Some("video only")
    }
}

/// Parse the whole `-F` output. Lines before the header row are ignored.
#[must_use]
pub fn parse_format_table(output: &str) -> Vec<FormatRow> {
    let mut rows = Vec::new();
    let mut in_table = false;

    for line in output.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('[') {
            continue;
        }
        if is_header(trimmed) {
            in_table = true;
            continue;
        }
        if !in_table || is_separator(trimmed) {
            continue;
        }

        let row = if trimmed.contains('│') || trimmed.contains('|') {
            parse_sectioned_row(trimmed)
        } else {
            parse_legacy_row(trimmed)
        };
        if let Some(row) = row {
            rows.push(row);
        }
    }

    rows
}

fn is_header(line: &str) -> bool {
    line.starts_with("ID ") || line.starts_with("format code")
}

fn is_separator(line: &str) -> bool {
    line.chars().all(|c| matches!(c, '─' | '-' | '═' | '=' | ' '))
}

fn is_bitrate(token: &str) -> bool {
    let number = token.trim_end_matches('k');
    !number.is_empty() && number.parse::<f64>().is_ok()
}

/// Splits `resolution` off the front, treating `audio only` as one value.
fn take_resolution(tokens: &[&str]) -> (String, usize) {
    match tokens {
        ["audio", "only", ..] => ("audio only".to_string(), 2),
        [first, ..] => ((*first).to_string(), 1),
        [] => (String::new(), 0),
    }
}

fn parse_sectioned_row(line: &str) -> Option<FormatRow> {
    let mut sections = line.split(['│', '|']);
    let first: Vec<&str> = sections.next()?.split_whitespace().collect();
    let second: Vec<&str> = sections
        .next()
        .map(|s| s.split_whitespace().collect())
        .unwrap_or_default();
    let third: Vec<&str> = sections
        .next()
        .map(|s| s.split_whitespace().collect())
        .unwrap_or_default();

    let [format_id, ext, rest @ ..] = first.as_slice() else {
        return None;
    };

    let (resolution, used) = take_resolution(rest);
    let numbers: Vec<&str> = rest[used..].to_vec();
    let (fps, channels) = if resolution == "audio only" {
        (None, numbers.first().and_then(|n| n.parse().ok()))
    } else {
        (
            numbers.first().and_then(|n| n.parse().ok()),
            numbers.get(1).and_then(|n| n.parse().ok()),
        )
    };

    let mut row = FormatRow {
        format_id: (*format_id).to_string(),
        ext: (*ext).to_string(),
        resolution,
        fps,
        channels,
        ..FormatRow::default()
    };

    parse_transfer_section(&second, &mut row);
    parse_codec_section(&third, &mut row);
    Some(row)
}

fn parse_transfer_section(tokens: &[&str], row: &mut FormatRow) {
    let Some((protocol, rest)) = tokens.split_last() else {
        return;
    };
    row.protocol = Some((*protocol).to_string());

    let mut approx = false;
    for token in rest {
        if matches!(*token, "~" | "≈") {
            approx = true;
            continue;
        }
        let (size, marked) = strip_approx(token);
        if size.ends_with('B') && parse_size_bytes(size).is_some() {
            row.filesize_text = Some(size.to_string());
            row.filesize_bytes = parse_size_bytes(size);
            row.filesize_approx = approx || marked;
        } else if is_bitrate(token) {
            row.tbr = Some((*token).to_string());
        }
    }
}

fn parse_codec_section(tokens: &[&str], row: &mut FormatRow) {
    let (vcodec, mut idx) = match tokens {
        ["audio", "only", ..] => ("audio only".to_string(), 2),
        [first, ..] => ((*first).to_string(), 1),
        [] => return,
    };

    if vcodec == "images" {
        row.vcodec = Some(vcodec);
        row.note = tokens[idx..].join(" ");
        return;
    }
    row.vcodec = Some(vcodec);

    if tokens.get(idx).is_some_and(|t| is_bitrate(t)) {
        idx += 1;
    }

    match &tokens[idx..] {
        ["video", "only", ..] => {
            row.acodec = Some("video only".to_string());
            idx += 2;
        }
        [codec, ..] => {
            row.acodec = Some((*codec).to_string());
            idx += 1;
        }
        [] => return,
    }

    // abr and asr
    for _ in 0..2 {
        if tokens.get(idx).is_some_and(|t| is_bitrate(t)) {
            idx += 1;
        }
    }

    row.note = tokens[idx..].join(" ");
}

fn parse_legacy_row(line: &str) -> Option<FormatRow> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let [format_id, ext, rest @ ..] = tokens.as_slice() else {
        return None;
    };
    let (resolution, used) = take_resolution(rest);

    Some(FormatRow {
        format_id: (*format_id).to_string(),
        ext: (*ext).to_string(),
        resolution,
        note: rest[used..].join(" "),
        ..FormatRow::default()
    })
}
