//! Structured telemetry pipeline.
//!
//! Two independent components that share the append-only-log idiom:
//!
//! - [`event_log`] — buffered JSON Lines event log with bulk and streaming reads
//! - [`recorder`] — bounded metric recorder with windowed health evaluation
//!
//! Callers compose them; neither depends on the other.

pub mod config;
pub mod error;
pub mod event_log;
pub mod observability;
pub mod recorder;

pub use config::TelemetryConfig;
pub use error::{TelemetryError, TelemetryResult};
pub use event_log::{EntryStream, EventLog, EventLogHandle, LogEntry};
pub use recorder::{MetricRecorder, SampleError};
