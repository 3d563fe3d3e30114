//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → TelemetryConfig (validated, immutable)
//!     → sections handed to EventLog / MetricRecorder / logging
//! ```
//!
//! # Design Decisions
//! - Config is consumed, not owned: components take their own section by value
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    Environment, EventLogConfig, LogFormat, ObservabilityConfig, ReadMode, RecorderConfig,
    TelemetryConfig,
};
