//! Runs one download to completion and streams its events.

use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::command::{to_command_line, CommandBuilder, CommandError};
use crate::parser::{InfoLevel, LineClassifier, PatternTable, PostProcessThresholds, ProgressEvent};
use crate::runner::{CancelReason, DownloadProcess, RunState, RunStateMachine, RunStats, SpawnError};
use crate::sink::{LogSink, Severity, TracingSink};

/// Number of stderr lines kept for failure reports.
pub const STDERR_TAIL_LINES: usize = 20;

/// Error type for download runs.
///
/// Cancellation and timeouts are not errors; they end the run in
/// [`RunState::Cancelled`].
#[derive(thiserror::Error, Debug)]
pub enum RunError {
    /// The downloader could not be started.
    #[error("Failed to spawn downloader: {0}")]
    Spawn(#[from] SpawnError),

    /// The output directory could not be created.
    #[error("Failed to create output directory {}: {source}", .path.display())]
    OutputDir {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A piped stream was not available after spawning.
    #[error("Downloader output pipes were not captured")]
    MissingPipe,

    /// Waiting for the process to exit failed.
    #[error("Failed to wait for downloader: {0}")]
    Wait(#[source] std::io::Error),
}

/// Which pipe a raw line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Events delivered while a run is in progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunEvent {
    /// A line exactly as the downloader printed it.
    Raw { stream: OutputStream, line: String },
    /// A classified line.
    Progress(ProgressEvent),
    /// Final state. Always the last event of a run.
    Finished(RunState),
}

/// Everything needed to start one download.
#[derive(Debug, Clone)]
pub struct RunRequest {
    executable: PathBuf,
    args: Vec<String>,
    output_dir: Option<PathBuf>,
    working_dir: Option<PathBuf>,
    timeout: Option<Duration>,
    rejections: Vec<CommandError>,
}

impl RunRequest {
    /// Create a request from a prepared argument vector.
    #[must_use]
    pub fn new(executable: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            executable: executable.into(),
            args,
            output_dir: None,
            working_dir: None,
            timeout: None,
            rejections: Vec::new(),
        }
    }

    /// Build the arguments for `url` and carry over the builder's output
    /// folder and rejected custom flags.
    ///
    /// # Errors
    ///
    /// Returns `CommandError` if the arguments cannot be built.
    pub fn from_builder(
        executable: impl Into<PathBuf>,
        builder: &mut CommandBuilder,
        url: &str,
    ) -> Result<Self, CommandError> {
        let rejections = builder.rejections().to_vec();
        let output_dir = builder.get_output_folder().map(Path::to_path_buf);
        let args = builder.build(url)?;

        Ok(Self {
            output_dir,
            rejections,
            ..Self::new(executable, args)
        })
    }

    /// Directory created before the process starts.
    #[must_use]
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Working directory of the process.
    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Kill the process if it runs longer than `timeout`.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Rejected custom flags to report as error events.
    #[must_use]
    pub fn rejections(mut self, rejections: Vec<CommandError>) -> Self {
        self.rejections = rejections;
        self
    }

    #[must_use]
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    #[must_use]
    pub fn get_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Shell-escaped rendering of the command, for logs.
    #[must_use]
    pub fn command_line(&self) -> String {
        to_command_line(&self.executable.to_string_lossy(), &self.args)
    }
}

/// Outcome of a run that got as far as spawning the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub state: RunState,
    /// `None` when the process was killed by a signal or never started.
    pub exit_code: Option<i32>,
    /// Last lines of stderr, newline separated.
    pub stderr_tail: String,
    pub stats: RunStats,
    pub elapsed: Duration,
}

impl RunResult {
    /// Result for a job cancelled before its process was started.
    #[must_use]
    pub fn cancelled_before_start(reason: CancelReason) -> Self {
        Self {
            state: RunState::Cancelled { reason },
            exit_code: None,
            stderr_tail: String::new(),
            stats: RunStats::default(),
            elapsed: Duration::ZERO,
        }
    }

    /// Returns true if the downloader exited with status 0.
    #[must_use]
    pub fn success(&self) -> bool {
        self.state == RunState::Completed
    }

    /// Returns true if the run was cancelled or timed out.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self.state, RunState::Cancelled { .. })
    }
}

/// Runs downloader processes.
///
/// Each run gets a fresh classifier built from the runner's pattern table,
/// so one runner can drive many concurrent runs.
#[derive(Clone)]
pub struct ProcessRunner {
    sink: Arc<dyn LogSink>,
    table: PatternTable,
    thresholds: PostProcessThresholds,
}

impl fmt::Debug for ProcessRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessRunner")
            .field("rules", &self.table.len())
            .field("thresholds", &self.thresholds)
            .finish_non_exhaustive()
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(Arc::new(TracingSink))
    }
}

impl ProcessRunner {
    #[must_use]
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self {
            sink,
            table: PatternTable::with_default_rules(),
            thresholds: PostProcessThresholds::default(),
        }
    }

    /// Replace the pattern table used for new runs.
    #[must_use]
    pub fn with_table(mut self, table: PatternTable) -> Self {
        self.table = table;
        self
    }

    /// Set the post-processing thresholds used for new runs.
    #[must_use]
    pub fn with_thresholds(mut self, thresholds: PostProcessThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    #[must_use]
    pub fn sink(&self) -> Arc<dyn LogSink> {
        Arc::clone(&self.sink)
    }

    fn classifier(&self) -> LineClassifier {
        let mut classifier = LineClassifier::new(Arc::clone(&self.sink))
            .with_table(self.table.clone())
            .with_thresholds(self.thresholds);
        classifier.reset();
        classifier
    }

    /// Run one download.
    ///
    /// Events are sent on `events` as lines arrive; a dropped receiver does
    /// not stop the run. Cancelling `cancel` or hitting the request timeout
    /// kills the whole process tree and ends the run as
    /// [`RunState::Cancelled`]. An already-cancelled token ends the run
    /// before anything is created or spawned.
    ///
    /// # Errors
    ///
    /// Returns `RunError` if the output directory cannot be created, the
    /// process cannot be spawned, or its exit status cannot be collected.
    pub async fn run(
        &self,
        request: RunRequest,
        cancel: CancellationToken,
        events: UnboundedSender<RunEvent>,
    ) -> Result<RunResult, RunError> {
        if cancel.is_cancelled() {
            tracing::debug!(command = %request.command_line(), "Cancelled before start");
            let result = RunResult::cancelled_before_start(CancelReason::Requested);
            emit(&events, RunEvent::Finished(result.state.clone()));
            return Ok(result);
        }

        let started = Instant::now();
        let deadline = request.timeout.map(|t| tokio::time::Instant::now() + t);
        let mut machine = RunStateMachine::new();

        if let Some(dir) = &request.output_dir {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| RunError::OutputDir {
                    path: dir.clone(),
                    source,
                })?;
        }

        self.sink
            .log(Severity::Info, &format!("Starting {}", request.command_line()));
        let mut process = DownloadProcess::spawn(
            &request.executable,
            &request.args,
            request.working_dir.as_deref(),
        )?;
        machine.transition(RunState::Running);

        let (Some(stdout), Some(stderr)) = (process.take_stdout(), process.take_stderr()) else {
            if let Err(e) = process.kill_tree().await {
                tracing::warn!(error = %e, "Failed to kill downloader");
            }
            return Err(RunError::MissingPipe);
        };

        let mut stdout_stats = RunStats::default();
        let mut stderr_stats = RunStats::default();
        for rejection in &request.rejections {
            stdout_stats.errors += 1;
            emit(
                &events,
                RunEvent::Progress(ProgressEvent::Error {
                    message: rejection.to_string(),
                }),
            );
        }

        let mut classifier = self.classifier();
        let mut tail = StderrTail::new(STDERR_TAIL_LINES);
        let readers = async {
            tokio::join!(
                pump_stdout(stdout, &mut classifier, &events, &mut stdout_stats),
                pump_stderr(
                    stderr,
                    &mut tail,
                    &events,
                    self.sink.as_ref(),
                    &mut stderr_stats
                ),
            )
        };

        let drained = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(CancelReason::Requested),
            () = until(deadline) => Err(CancelReason::TimedOut),
            _ = readers => Ok(()),
        };

        let exited = match drained {
            Ok(()) => tokio::select! {
                biased;
                () = cancel.cancelled() => Err(CancelReason::Requested),
                () = until(deadline) => Err(CancelReason::TimedOut),
                status = process.wait() => Ok(status.map_err(RunError::Wait)?),
            },
            Err(reason) => Err(reason),
        };

        let (state, exit_code) = match exited {
            Ok(status) if status.success() => (RunState::Completed, status.code()),
            Ok(status) => (
                RunState::Failed {
                    exit_code: status.code(),
                    stderr: tail.joined(),
                },
                status.code(),
            ),
            Err(reason) => {
                self.sink.log(
                    Severity::Warning,
                    &format!("Download {reason}, stopping downloader"),
                );
                let exit_code = match process.kill_tree().await {
                    Ok(status) => status.code(),
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to kill downloader");
                        None
                    }
                };
                (RunState::Cancelled { reason }, exit_code)
            }
        };

        machine.record_output(stdout_stats);
        machine.record_output(stderr_stats);
        machine.transition(state.clone());

        let elapsed = started.elapsed();
        tracing::info!(state = ?state, exit_code = ?exit_code, elapsed = ?elapsed, "Download finished");
        emit(&events, RunEvent::Finished(state.clone()));

        Ok(RunResult {
            state,
            exit_code,
            stderr_tail: tail.joined(),
            stats: machine.stats(),
            elapsed,
        })
    }
}

fn emit(events: &UnboundedSender<RunEvent>, event: RunEvent) {
    if events.send(event).is_err() {
        tracing::trace!("Event receiver dropped");
    }
}

async fn until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Read one line, replacing invalid UTF-8. `None` at EOF or on error.
async fn next_line<R>(
    reader: &mut BufReader<R>,
    buf: &mut Vec<u8>,
    stream: OutputStream,
) -> Option<String>
where
    R: AsyncRead + Unpin,
{
    buf.clear();
    match reader.read_until(b'\n', buf).await {
        Ok(0) => None,
        Ok(_) => {
            let line = String::from_utf8_lossy(buf);
            Some(line.trim_end_matches(['\r', '\n']).to_string())
        }
        Err(e) => {
            tracing::warn!(?stream, error = %e, "Stopped reading downloader output");
            None
        }
    }
}

async fn pump_stdout<R>(
    reader: R,
    classifier: &mut LineClassifier,
    events: &UnboundedSender<RunEvent>,
    stats: &mut RunStats,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    while let Some(line) = next_line(&mut reader, &mut buf, OutputStream::Stdout).await {
        stats.stdout_lines += 1;
        emit(
            events,
            RunEvent::Raw {
                stream: OutputStream::Stdout,
                line: line.clone(),
            },
        );
        if line.trim().is_empty() {
            continue;
        }

        let event = classifier.classify(&line);
        if event.is_error() {
            stats.errors += 1;
        }
        emit(events, RunEvent::Progress(event));
    }
}

async fn pump_stderr<R>(
    reader: R,
    tail: &mut StderrTail,
    events: &UnboundedSender<RunEvent>,
    sink: &dyn LogSink,
    stats: &mut RunStats,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    while let Some(line) = next_line(&mut reader, &mut buf, OutputStream::Stderr).await {
        stats.stderr_lines += 1;
        emit(
            events,
            RunEvent::Raw {
                stream: OutputStream::Stderr,
                line: line.clone(),
            },
        );
        if line.trim().is_empty() {
            continue;
        }

        let event = stderr_event(&line);
        if event.is_error() {
            stats.errors += 1;
            sink.log(Severity::Error, &line);
        } else {
            sink.log(Severity::Warning, &line);
        }
        emit(events, RunEvent::Progress(event));
        tail.push(line);
    }
}

/// Map a stderr line to an event. Warnings stay warnings; everything else
/// on stderr is an error.
fn stderr_event(line: &str) -> ProgressEvent {
    let trimmed = line.trim();
    if trimmed.starts_with("WARNING:") {
        return ProgressEvent::UnclassifiedInfo {
            raw: trimmed.to_string(),
            level: InfoLevel::Warning,
        };
    }
    let message = trimmed.strip_prefix("ERROR:").unwrap_or(trimmed).trim();
    ProgressEvent::Error {
        message: message.to_string(),
    }
}

/// Bounded buffer of the most recent stderr lines.
#[derive(Debug)]
struct StderrTail {
    lines: VecDeque<String>,
    capacity: usize,
}

impl StderrTail {
    fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, line: String) {
        if self.capacity == 0 {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    fn joined(&self) -> String {
        self.lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
    }
}
