//! Error taxonomy for the telemetry pipeline.
//!
//! A missing log file is not an error: every read path maps it to an
//! empty result before any of these variants can be produced.

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the event log and its writer task.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Filesystem operation failed (open, read, write).
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A line could not be parsed as a log entry.
    #[error("malformed entry at {}:{line}: {source}", .path.display())]
    MalformedEntry {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// An entry could not be serialized to JSON.
    #[error("failed to serialize entry: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The writer task has exited and no longer accepts commands.
    #[error("event log writer is closed")]
    WriterClosed,
}

impl TelemetryError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
