//! Point-in-time health evaluation.
//!
//! # Responsibilities
//! - Combine summary rows into an overall status
//! - Detect synthetic samples recorded while running in production
//! - Report buffer pressure and slow operations
//!
//! # Design Decisions
//! - Derived on every call, never stored
//! - A synthetic leak degrades status regardless of error rates

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Environment;
use crate::recorder::aggregate::{format_percent, SummaryRow};
use crate::recorder::buffer::CircularSampleBuffer;
use crate::recorder::sample::MetricSample;

/// Overall status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Ok,
    Degraded,
}

impl HealthState {
    pub fn as_str(self) -> &'static str {
        match self {
            HealthState::Ok => "ok",
            HealthState::Degraded => "degraded",
        }
    }
}

/// Health snapshot consumed by dashboards and exposition formatters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub status: HealthState,
    pub environment: Environment,
    /// Operations with activity inside the retention window.
    pub total_operations: usize,
    pub unhealthy_operations: Vec<String>,
    pub slow_operations: Vec<String>,
    pub synthetic_leak: bool,
    pub buffer_size: usize,
    pub buffer_capacity: usize,
    pub buffer_utilization: String,
    pub checked_at: DateTime<Utc>,
}

impl HealthStatus {
    pub fn is_ok(&self) -> bool {
        self.status == HealthState::Ok
    }
}

/// Everything a dashboard needs in one read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsExport {
    pub recent: Vec<MetricSample>,
    pub summary: Vec<SummaryRow>,
    pub health: HealthStatus,
}

pub(crate) fn evaluate(
    rows: &[SummaryRow],
    buffer: &CircularSampleBuffer,
    environment: Environment,
    slow_threshold_ms: u64,
    now: DateTime<Utc>,
) -> HealthStatus {
    let synthetic_leak = environment.is_production() && buffer.iter().any(|s| s.is_synthetic);

    let unhealthy_operations: Vec<String> = rows
        .iter()
        .filter(|row| !row.is_healthy)
        .map(|row| row.function.clone())
        .collect();

    let slow_operations = rows
        .iter()
        .filter(|row| row.avg_duration > slow_threshold_ms)
        .map(|row| row.function.clone())
        .collect();

    let status = if unhealthy_operations.is_empty() && !synthetic_leak {
        HealthState::Ok
    } else {
        HealthState::Degraded
    };

    HealthStatus {
        status,
        environment,
        total_operations: rows.len(),
        unhealthy_operations,
        slow_operations,
        synthetic_leak,
        buffer_size: buffer.len(),
        buffer_capacity: buffer.capacity(),
        buffer_utilization: format_percent(buffer.utilization()),
        checked_at: now,
    }
}
