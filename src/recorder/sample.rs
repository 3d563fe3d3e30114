//! Metric sample model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Error details attached to a failed operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleError {
    pub message: String,
    pub trace: Option<String>,
}

impl SampleError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            trace: None,
        }
    }

    pub fn with_trace(mut self, trace: impl Into<String>) -> Self {
        self.trace = Some(trace.into());
        self
    }

    /// Capture an error and its `source()` chain, one cause per line.
    pub fn from_error(error: &(dyn std::error::Error + 'static)) -> Self {
        let mut causes = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            causes.push(format!("caused by: {}", cause));
            source = cause.source();
        }

        Self {
            message: error.to_string(),
            trace: (!causes.is_empty()).then(|| causes.join("\n")),
        }
    }
}

impl From<&str> for SampleError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for SampleError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// One timed observation of an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSample {
    pub operation_name: String,
    pub duration_ms: u64,
    pub is_synthetic: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_trace: Option<String>,
}

impl MetricSample {
    pub fn is_error(&self) -> bool {
        self.error_message.is_some()
    }
}

/// Whole milliseconds, rounded to nearest.
pub fn round_millis(duration: Duration) -> u64 {
    (duration.as_secs_f64() * 1000.0).round() as u64
}
