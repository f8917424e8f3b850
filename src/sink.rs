//! Injected logging capability.
//!
//! Components that the caller constructs (classifier, command builder,
//! process runner) take an `Arc<dyn LogSink>` instead of writing to a global
//! logger, so embedders can route records wherever they like.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Severity of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        };
        f.write_str(label)
    }
}

/// Receiver of `(severity, message)` records.
pub trait LogSink: Send + Sync {
    /// Record a message.
    fn log(&self, severity: Severity, message: &str);
}

/// Sink that forwards records to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Debug => tracing::debug!(target: "ytdlp_driver", "{message}"),
            Severity::Info => tracing::info!(target: "ytdlp_driver", "{message}"),
            Severity::Warning => tracing::warn!(target: "ytdlp_driver", "{message}"),
            Severity::Error => tracing::error!(target: "ytdlp_driver", "{message}"),
        }
    }
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl LogSink for NullSink {
    fn log(&self, _severity: Severity, _message: &str) {}
}

/// Shared handle to the default sink.
#[must_use]
pub fn default_sink() -> Arc<dyn LogSink> {
    Arc::new(TracingSink)
}
