//! Downloader process spawning and teardown.

use std::path::Path;
use std::process::{ExitStatus, Stdio};

use tokio::process::{Child, ChildStderr, ChildStdout, Command};

/// Why the downloader could not be started.
#[derive(thiserror::Error, Debug)]
pub enum SpawnError {
    #[error("Downloader executable not found")]
    NotFound,
    #[error("Downloader executable is not executable (permission denied)")]
    PermissionDenied,
    #[error("Failed to start downloader: {0}")]
    Io(#[from] std::io::Error),
}

impl SpawnError {
    fn from_io(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound,
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            _ => Self::Io(err),
        }
    }
}

/// A running downloader process with piped stdout and stderr.
///
/// On Unix the process leads its own process group so that helpers it
/// starts (ffmpeg, aria2c) can be killed with it.
#[derive(Debug)]
pub struct DownloadProcess {
    child: Child,
}

impl DownloadProcess {
    /// Spawn `executable` with `args`. No shell is involved.
    ///
    /// # Errors
    ///
    /// Returns `SpawnError` if the process fails to spawn.
    pub fn spawn(
        executable: &Path,
        args: &[String],
        working_dir: Option<&Path>,
    ) -> Result<Self, SpawnError> {
        let mut cmd = Command::new(executable);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = working_dir {
            cmd.current_dir(dir);
        }

        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn().map_err(SpawnError::from_io)?;
        tracing::debug!(pid = ?child.id(), executable = %executable.display(), "Spawned downloader");

        Ok(Self { child })
    }

    /// Stdout pipe; `None` once taken.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Stderr pipe; `None` once taken.
    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    /// OS process id, `None` after the process has been reaped.
    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Wait for a normal exit.
    ///
    /// # Errors
    ///
    /// Propagates the I/O error from reaping the child.
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Kill the process and everything it started, then reap it.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be killed or reaped.
    pub async fn kill_tree(&mut self) -> std::io::Result<ExitStatus> {
        #[cfg(unix)]
        self.kill_group();

        #[cfg(windows)]
        self.taskkill().await;

        if let Err(e) = self.child.start_kill() {
            // Already reaped.
            if e.kind() != std::io::ErrorKind::InvalidInput {
                return Err(e);
            }
        }
        self.child.wait().await
    }

    #[cfg(unix)]
    fn kill_group(&self) {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        let Some(pid) = self.id() else {
            return;
        };
        let Ok(raw) = i32::try_from(pid) else {
            return;
        };
        if let Err(e) = killpg(Pid::from_raw(raw), Signal::SIGKILL) {
            tracing::debug!(pid, error = %e, "Failed to signal process group");
        }
    }

    #[cfg(windows)]
    async fn taskkill(&self) {
        let Some(pid) = self.id() else {
            return;
        };
        let status = Command::new("taskkill")
            .args(["/PID", &pid.to_string(), "/T", "/F"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        match status {
            Ok(status) if status.success() => {}
            Ok(status) => tracing::debug!(pid, ?status, "taskkill did not succeed"),
            Err(e) => tracing::debug!(pid, error = %e, "Failed to run taskkill"),
        }
    }
}
