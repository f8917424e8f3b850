//! Single-shot invocations that capture output instead of streaming it:
//! metadata retrieval and format listing.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;

use crate::command::CommandError;
use crate::parser::{parse_format_table, parse_metadata, FormatRow, VideoMetadata};
use crate::runner::{CancelReason, DownloadProcess, SpawnError};

/// Error type for single-shot invocations.
#[derive(thiserror::Error, Debug)]
pub enum OneshotError {
    /// The request was invalid.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// The downloader could not be started.
    #[error("Failed to spawn downloader: {0}")]
    Spawn(#[from] SpawnError),

    /// Reading output or waiting for exit failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The downloader exited unsuccessfully.
    #[error("Downloader exited with code {exit_code:?}: {stderr}")]
    Exited {
        exit_code: Option<i32>,
        stderr: String,
    },

    /// The invocation was cancelled or timed out.
    #[error("Downloader {0}")]
    Cancelled(CancelReason),

    /// The metadata document could not be parsed.
    #[error("Failed to parse metadata: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Runs the downloader once and captures its output.
#[derive(Debug, Clone)]
pub struct Oneshot {
    executable: PathBuf,
    extra_args: Vec<String>,
    timeout: Option<Duration>,
}

impl Oneshot {
    #[must_use]
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            extra_args: Vec::new(),
            timeout: None,
        }
    }

    /// Arguments placed before the URL (network options, cookies).
    #[must_use]
    pub fn extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    /// Kill the process if it runs longer than `timeout`.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Fetch metadata for `url` without downloading it.
    ///
    /// # Errors
    ///
    /// Returns `OneshotError` if the process fails, exits nonzero, is
    /// cancelled, or prints an unparseable document.
    pub async fn fetch_metadata(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<VideoMetadata, OneshotError> {
        let args = self.args(&["--dump-single-json", "--no-warnings", "--skip-download"], url)?;
        let stdout = self.capture(&args, cancel).await?;
        let metadata = parse_metadata(&stdout)?;
        tracing::debug!(id = %metadata.id, formats = metadata.formats.len(), "Fetched metadata");
        Ok(metadata)
    }

    /// List the formats available for `url`.
    ///
    /// # Errors
    ///
    /// Returns `OneshotError` if the process fails, exits nonzero, or is
    /// cancelled.
    pub async fn list_formats(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<FormatRow>, OneshotError> {
        let args = self.args(&["-F"], url)?;
        let stdout = self.capture(&args, cancel).await?;
        let rows = parse_format_table(&stdout);
        tracing::debug!(rows = rows.len(), "Listed formats");
        Ok(rows)
    }

    fn args(&self, mode: &[&str], url: &str) -> Result<Vec<String>, CommandError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(CommandError::EmptyUrl);
        }

        let mut args: Vec<String> = mode.iter().map(|arg| (*arg).to_string()).collect();
        args.extend(self.extra_args.iter().cloned());
        args.push("--".to_string());
        args.push(url.to_string());
        Ok(args)
    }

    async fn capture(
        &self,
        args: &[String],
        cancel: &CancellationToken,
    ) -> Result<String, OneshotError> {
        let mut process = DownloadProcess::spawn(&self.executable, args, None)?;
        let (Some(stdout), Some(stderr)) = (process.take_stdout(), process.take_stderr()) else {
            process.kill_tree().await?;
            return Err(OneshotError::Io(std::io::Error::other(
                "downloader output pipes were not captured",
            )));
        };

        let timeout = async {
            match self.timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending().await,
            }
        };

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(CancelReason::Requested),
            () = timeout => Err(CancelReason::TimedOut),
            output = async {
                let (out, err) = tokio::join!(read_all(stdout), read_all(stderr));
                let status = process.wait().await;
                (out, err, status)
            } => Ok(output),
        };

        match outcome {
            Ok((stdout, stderr, status)) => {
                let status = status?;
                let stderr = stderr?;
                if status.success() {
                    Ok(stdout?)
                } else {
                    Err(OneshotError::Exited {
                        exit_code: status.code(),
                        stderr: stderr.trim().to_string(),
                    })
                }
            }
            Err(reason) => {
                process.kill_tree().await?;
                Err(OneshotError::Cancelled(reason))
            }
        }
    }
}

async fn read_all<R>(mut reader: R) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
