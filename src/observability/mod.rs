//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Pipeline components produce:
//!     → logging.rs (structured tracing events, per-sample lines in production)
//!     → metrics.rs (counters, histograms, health gauges via the `metrics` facade)
//!
//! Consumers:
//!     → Log aggregation (stderr, JSON or pretty)
//!     → Whatever exporter the host process installs for `metrics`
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - No exporter is installed here; without one the facade calls are no-ops

pub mod logging;
pub mod metrics;
