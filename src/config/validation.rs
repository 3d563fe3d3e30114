//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (capacities and intervals > 0)
//! - Reject unknown log levels before the subscriber is built
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: TelemetryConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;

use crate::config::schema::TelemetryConfig;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("event_log.path must not be empty")]
    EmptyPath,

    #[error("unknown log level '{0}'")]
    UnknownLogLevel(String),
}

/// Check a parsed configuration for semantic errors.
pub fn validate_config(config: &TelemetryConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.event_log.path.as_os_str().is_empty() {
        errors.push(ValidationError::EmptyPath);
    }

    let positive = [
        ("event_log.flush_max_bytes", config.event_log.flush_max_bytes as u64),
        ("event_log.flush_max_entries", config.event_log.flush_max_entries as u64),
        ("recorder.capacity", config.recorder.capacity as u64),
        ("recorder.retention_secs", config.recorder.retention_secs),
        ("recorder.prune_interval_secs", config.recorder.prune_interval_secs),
    ];
    for (field, value) in positive {
        if value == 0 {
            errors.push(ValidationError::Zero { field });
        }
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::UnknownLogLevel(
            config.observability.log_level.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&TelemetryConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = TelemetryConfig::default();
        config.event_log.path = PathBuf::new();
        config.recorder.capacity = 0;
        config.observability.log_level = "verbose".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&ValidationError::EmptyPath));
        assert!(errors.contains(&ValidationError::Zero { field: "recorder.capacity" }));
        assert!(errors.contains(&ValidationError::UnknownLogLevel("verbose".into())));
    }
}
