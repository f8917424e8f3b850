//! Run state machine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Why a run was stopped before the downloader exited on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// The caller cancelled the run.
    Requested,
    /// The run exceeded its time limit.
    TimedOut,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => f.write_str("cancelled"),
            Self::TimedOut => f.write_str("timed out"),
        }
    }
}

/// Current state of a download run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    #[default]
    NotStarted,
    Running,
    Completed,
    Failed {
        /// `None` when the process was killed by a signal.
        exit_code: Option<i32>,
        stderr: String,
    },
    Cancelled {
        reason: CancelReason,
    },
}

impl RunState {
    /// Returns true for `Completed`, `Failed` and `Cancelled`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed { .. } | Self::Cancelled { .. }
        )
    }
}

/// State machine for tracking one run.
#[derive(Debug, Clone, Default)]
pub struct RunStateMachine {
    state: RunState,
    stdout_lines: usize,
    stderr_lines: usize,
    errors: usize,
}

impl RunStateMachine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Move to `new_state`. Terminal states are final; returns false if the
    /// transition was ignored.
    pub fn transition(&mut self, new_state: RunState) -> bool {
        if self.state.is_terminal() {
            tracing::debug!(from = ?self.state, to = ?new_state, "Ignoring transition out of terminal state");
            return false;
        }
        tracing::debug!(from = ?self.state, to = ?new_state, "Run state transition");
        self.state = new_state;
        true
    }

    /// Add counts gathered by the stream readers.
    pub fn record_output(&mut self, output: RunStats) {
        self.stdout_lines = self.stdout_lines.saturating_add(output.stdout_lines);
        self.stderr_lines = self.stderr_lines.saturating_add(output.stderr_lines);
        self.errors = self.errors.saturating_add(output.errors);
    }

    #[must_use]
    pub fn stats(&self) -> RunStats {
        RunStats {
            stdout_lines: self.stdout_lines,
            stderr_lines: self.stderr_lines,
            errors: self.errors,
        }
    }
}

/// Run statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub stdout_lines: usize,
    pub stderr_lines: usize,
    /// `Error` events emitted, from either stream.
    pub errors: usize,
}
