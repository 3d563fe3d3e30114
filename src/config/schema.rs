//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the pipeline.
//! All types derive Serde traits for deserialization from config files, and
//! every field has a default so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Root configuration for the telemetry pipeline.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Durable event log settings.
    pub event_log: EventLogConfig,

    /// Metric recorder settings.
    pub recorder: RecorderConfig,

    /// Logging settings.
    pub observability: ObservabilityConfig,
}

/// How read paths treat a line that is not valid JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReadMode {
    /// Reject the whole read.
    #[default]
    Strict,
    /// Skip the line and log a warning.
    Lax,
}

/// Event log configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EventLogConfig {
    /// Target JSON Lines file.
    pub path: PathBuf,

    /// Flush once buffered bytes exceed this size.
    pub flush_max_bytes: usize,

    /// Flush once buffered entries exceed this count.
    pub flush_max_entries: usize,

    /// Parse failure policy for `read_all` and `stream`.
    pub read_mode: ReadMode,
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("telemetry/events.jsonl"),
            flush_max_bytes: 64 * 1024,
            flush_max_entries: 100,
            read_mode: ReadMode::Strict,
        }
    }
}

/// Execution environment a sample is recorded under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    #[default]
    Development,
    Test,
}

impl Environment {
    pub fn is_production(self) -> bool {
        matches!(self, Environment::Production)
    }

    /// Samples recorded under the test environment are synthetic.
    pub fn is_synthetic(self) -> bool {
        matches!(self, Environment::Test)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Production => "production",
            Environment::Development => "development",
            Environment::Test => "test",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "development" | "dev" => Ok(Environment::Development),
            "test" | "mock" => Ok(Environment::Test),
            other => Err(format!("unknown environment '{}'", other)),
        }
    }
}

/// Metric recorder configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Maximum number of samples kept in the circular buffer.
    pub capacity: usize,

    /// Aggregates older than this are excluded from summaries and pruned.
    pub retention_secs: u64,

    /// Operations averaging above this duration are reported as slow.
    pub slow_threshold_ms: u64,

    /// Delay between arming the pruning sweep and running it.
    pub prune_interval_secs: u64,

    /// Default environment for `record`.
    pub environment: Environment,
}

impl RecorderConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn prune_interval(&self) -> Duration {
        Duration::from_secs(self.prune_interval_secs)
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            retention_secs: 60 * 60,
            slow_threshold_ms: 50,
            prune_interval_secs: 60,
            environment: Environment::Development,
        }
    }
}

/// Output format for the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// JSON for log aggregation, pretty for terminals.
    pub log_format: LogFormat,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}
