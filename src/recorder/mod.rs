//! Metric recorder and health evaluator.
//!
//! # Data Flow
//! ```text
//! record(operation, started, error?)
//!     → sample.rs (MetricSample, synthetic flag from Environment)
//!     → buffer.rs (CircularSampleBuffer, evicts oldest at capacity)
//!     → aggregate.rs (AggregateRecord per operation name)
//!     → arm one pruning sweep if none is pending
//!
//! summary() / health_status() / export_metrics()
//!     → aggregates inside the retention window only
//!     → health.rs (status, slow operations, synthetic leak)
//! ```
//!
//! # State Machine
//! ```text
//! Idle → Recording: first record()
//! Recording → Idle: reset()
//! Sweep: Unarmed → Armed on record(), Armed → Unarmed when it fires or on reset()
//! ```

pub mod aggregate;
pub mod buffer;
pub mod health;
pub mod metric_recorder;
pub mod sample;

pub use aggregate::{AggregateRecord, SummaryRow};
pub use buffer::CircularSampleBuffer;
pub use health::{HealthState, HealthStatus, MetricsExport};
pub use metric_recorder::{MetricRecorder, DEFAULT_RECENT_LIMIT, EXPORT_RECENT_LIMIT};
pub use sample::{MetricSample, SampleError};
