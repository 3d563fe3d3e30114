//! Metrics facade bridge.
//!
//! # Metrics
//! - `telemetry_operation_calls_total` (counter): samples by operation
//! - `telemetry_operation_errors_total` (counter): failed samples by operation
//! - `telemetry_operation_duration_ms` (histogram): sample durations
//! - `telemetry_operation_avg_duration_ms` (gauge): windowed average per operation
//! - `telemetry_operation_healthy` (gauge): 1=healthy, 0=unhealthy
//! - `telemetry_health_ok` (gauge): overall status
//! - `telemetry_buffer_samples` (gauge): circular buffer fill
//! - `telemetry_synthetic_leak` (gauge): 1 when test samples were seen in production

use metrics::{counter, gauge, histogram};

use crate::recorder::{HealthStatus, MetricSample, SummaryRow};

/// Mirror one sample into counters and the duration histogram.
pub fn record_sample(sample: &MetricSample) {
    let operation = sample.operation_name.clone();
    counter!("telemetry_operation_calls_total", "operation" => operation.clone()).increment(1);
    if sample.is_error() {
        counter!("telemetry_operation_errors_total", "operation" => operation.clone()).increment(1);
    }
    histogram!("telemetry_operation_duration_ms", "operation" => operation)
        .record(sample.duration_ms as f64);
}

/// Publish a health snapshot as gauges.
pub fn publish_health(health: &HealthStatus, summary: &[SummaryRow]) {
    gauge!("telemetry_health_ok").set(if health.is_ok() { 1.0 } else { 0.0 });
    gauge!("telemetry_buffer_samples").set(health.buffer_size as f64);
    gauge!("telemetry_synthetic_leak").set(if health.synthetic_leak { 1.0 } else { 0.0 });

    for row in summary {
        gauge!("telemetry_operation_avg_duration_ms", "operation" => row.function.clone())
            .set(row.avg_duration as f64);
        gauge!("telemetry_operation_healthy", "operation" => row.function.clone())
            .set(if row.is_healthy { 1.0 } else { 0.0 });
    }
}
