//! Per-operation rolling aggregates and the summary rows derived from them.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Running totals for one operation name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateRecord {
    pub count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
    pub last_updated: DateTime<Utc>,
}

impl AggregateRecord {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            count: 0,
            total_duration_ms: 0,
            error_count: 0,
            last_updated: at,
        }
    }

    pub fn observe(&mut self, duration_ms: u64, is_error: bool, at: DateTime<Utc>) {
        self.count += 1;
        self.total_duration_ms = self.total_duration_ms.saturating_add(duration_ms);
        if is_error {
            self.error_count += 1;
        }
        self.last_updated = self.last_updated.max(at);
    }

    /// Mean duration in whole milliseconds, 0 before the first sample.
    pub fn average_ms(&self) -> u64 {
        if self.count == 0 {
            0
        } else {
            (self.total_duration_ms as f64 / self.count as f64).round() as u64
        }
    }

    /// Error ratio strictly below 1%. Integer arithmetic keeps the boundary exact.
    pub fn is_healthy(&self) -> bool {
        self.count > 0 && self.error_count * 100 < self.count
    }

    pub fn error_rate_percent(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.error_count as f64 / self.count as f64 * 100.0
        }
    }

    /// True while `last_updated` lies within `window` of `now`.
    pub fn is_within(&self, window: Duration, now: DateTime<Utc>) -> bool {
        match ChronoDuration::from_std(window) {
            Ok(window) => now.signed_duration_since(self.last_updated) <= window,
            Err(_) => true,
        }
    }

    pub fn to_row(&self, function: &str) -> SummaryRow {
        SummaryRow {
            function: function.to_string(),
            avg_duration: self.average_ms(),
            call_count: self.count,
            error_count: self.error_count,
            error_rate: format_percent(self.error_rate_percent()),
            is_healthy: self.is_healthy(),
            last_updated: self.last_updated,
        }
    }
}

/// One operation's line in a summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRow {
    pub function: String,
    pub avg_duration: u64,
    pub call_count: u64,
    pub error_count: u64,
    pub error_rate: String,
    pub is_healthy: bool,
    pub last_updated: DateTime<Utc>,
}

/// Two-decimal percentage string, e.g. `"1.00%"`.
pub fn format_percent(value: f64) -> String {
    format!("{:.2}%", value)
}
