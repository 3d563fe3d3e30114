//! Metric recorder.
//!
//! # Responsibilities
//! - Record timed operation samples into a bounded buffer
//! - Maintain per-operation aggregates
//! - Answer summary and health queries over the retention window
//! - Prune stale aggregates on a one-shot timer
//!
//! # Design Decisions
//! - All mutable state sits behind one mutex; the critical section is CPU-only
//! - The environment is passed in, never read from process globals
//! - At most one sweep is armed; a generation counter invalidates stale timers
//! - A timer task that ended without sweeping (its runtime shut down) counts as unarmed

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

use crate::config::{Environment, RecorderConfig};
use crate::observability::metrics;
use crate::recorder::aggregate::{AggregateRecord, SummaryRow};
use crate::recorder::buffer::CircularSampleBuffer;
use crate::recorder::health::{evaluate, HealthStatus, MetricsExport};
use crate::recorder::sample::{round_millis, MetricSample, SampleError};

/// Default number of samples returned by `recent_metrics` callers that don't care.
pub const DEFAULT_RECENT_LIMIT: usize = 100;

/// Samples included in `export_metrics`.
pub const EXPORT_RECENT_LIMIT: usize = 1000;

/// Pruning sweep state.
#[derive(Debug)]
enum Sweep {
    Unarmed,
    /// Timer task running inside a tokio runtime.
    Scheduled { generation: u64, task: JoinHandle<()> },
    /// No runtime: the first `record` after `due` runs the sweep inline.
    Deferred { due: Instant },
}

#[derive(Debug)]
struct RecorderState {
    samples: CircularSampleBuffer,
    aggregates: HashMap<String, AggregateRecord>,
    sweep: Sweep,
    generation: u64,
}

impl RecorderState {
    fn prune(&mut self, retention: Duration, now: DateTime<Utc>) -> usize {
        let before = self.aggregates.len();
        self.aggregates
            .retain(|_, record| record.is_within(retention, now));
        before - self.aggregates.len()
    }

    /// Forget a timer task that finished without running the sweep.
    fn reap_sweep(&mut self) {
        if matches!(&self.sweep, Sweep::Scheduled { task, .. } if task.is_finished()) {
            tracing::debug!("Sweep timer ended without running, re-arming");
            self.sweep = Sweep::Unarmed;
        }
    }

    fn disarm(&mut self) {
        if let Sweep::Scheduled { task, .. } = std::mem::replace(&mut self.sweep, Sweep::Unarmed) {
            task.abort();
        }
    }
}

#[derive(Debug)]
struct Shared {
    config: RecorderConfig,
    state: Mutex<RecorderState>,
}

/// Thread-safe recorder; clones share the same state.
#[derive(Debug, Clone)]
pub struct MetricRecorder {
    shared: Arc<Shared>,
}

impl Default for MetricRecorder {
    fn default() -> Self {
        Self::new(RecorderConfig::default())
    }
}

impl MetricRecorder {
    pub fn new(config: RecorderConfig) -> Self {
        let state = RecorderState {
            samples: CircularSampleBuffer::new(config.capacity),
            aggregates: HashMap::new(),
            sweep: Sweep::Unarmed,
            generation: 0,
        };
        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(state),
            }),
        }
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.shared.config
    }

    pub fn environment(&self) -> Environment {
        self.shared.config.environment
    }

    fn lock(&self) -> MutexGuard<'_, RecorderState> {
        lock_state(&self.shared)
    }

    /// Record an operation that started at `started` and ends now.
    pub fn record(&self, operation: &str, started: Instant, error: Option<SampleError>) -> MetricSample {
        self.record_in(self.environment(), operation, started, error)
    }

    /// Like `record`, under an explicit environment.
    pub fn record_in(
        &self,
        environment: Environment,
        operation: &str,
        started: Instant,
        error: Option<SampleError>,
    ) -> MetricSample {
        self.record_at(environment, operation, started.elapsed(), Utc::now(), error)
    }

    /// Record a sample with an explicit duration and completion time.
    pub fn record_at(
        &self,
        environment: Environment,
        operation: &str,
        duration: Duration,
        finished_at: DateTime<Utc>,
        error: Option<SampleError>,
    ) -> MetricSample {
        let (error_message, error_trace) = match error {
            Some(e) => (Some(e.message), e.trace),
            None => (None, None),
        };
        let sample = MetricSample {
            operation_name: operation.to_string(),
            duration_ms: round_millis(duration),
            is_synthetic: environment.is_synthetic(),
            timestamp: finished_at,
            error_message,
            error_trace,
        };

        {
            let mut state = self.lock();
            self.run_deferred_sweep(&mut state);

            state.samples.push(sample.clone());
            state
                .aggregates
                .entry(sample.operation_name.clone())
                .or_insert_with(|| AggregateRecord::new(finished_at))
                .observe(sample.duration_ms, sample.is_error(), finished_at);

            self.arm_sweep(&mut state);
        }

        if self.environment().is_production() {
            tracing::info!(
                target: "telemetry::sample",
                operation = %sample.operation_name,
                duration_ms = sample.duration_ms,
                synthetic = sample.is_synthetic,
                error = sample.error_message.as_deref(),
                timestamp = %sample.timestamp,
                "metric sample"
            );
        }
        metrics::record_sample(&sample);

        sample
    }

    fn run_deferred_sweep(&self, state: &mut RecorderState) {
        if let Sweep::Deferred { due } = state.sweep {
            if Instant::now() >= due {
                state.sweep = Sweep::Unarmed;
                let removed = state.prune(self.shared.config.retention(), Utc::now());
                tracing::debug!(removed, "Deferred aggregate sweep ran");
            }
        }
    }

    fn arm_sweep(&self, state: &mut RecorderState) {
        state.reap_sweep();
        if !matches!(state.sweep, Sweep::Unarmed) {
            return;
        }

        let interval = self.shared.config.prune_interval();
        state.sweep = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                state.generation += 1;
                let generation = state.generation;
                let weak = Arc::downgrade(&self.shared);
                let task = runtime.spawn(sweep_after(weak, generation, interval));
                Sweep::Scheduled { generation, task }
            }
            Err(_) => Sweep::Deferred {
                due: Instant::now() + interval,
            },
        };
    }

    /// True while a sweep is pending.
    pub fn sweep_armed(&self) -> bool {
        let mut state = self.lock();
        state.reap_sweep();
        !matches!(state.sweep, Sweep::Unarmed)
    }

    /// Remove aggregates last updated before the retention window. Returns how many.
    pub fn prune_stale(&self, now: DateTime<Utc>) -> usize {
        self.lock().prune(self.shared.config.retention(), now)
    }

    /// Number of aggregates in storage, including ones outside the window.
    pub fn aggregate_count(&self) -> usize {
        self.lock().aggregates.len()
    }

    pub fn sample_count(&self) -> usize {
        self.lock().samples.len()
    }

    /// Summary rows for operations active within the retention window.
    pub fn summary(&self) -> Vec<SummaryRow> {
        self.summary_at(Utc::now())
    }

    pub fn summary_at(&self, now: DateTime<Utc>) -> Vec<SummaryRow> {
        let state = self.lock();
        self.rows(&state, now)
    }

    fn rows(&self, state: &RecorderState, now: DateTime<Utc>) -> Vec<SummaryRow> {
        let retention = self.shared.config.retention();
        let mut rows: Vec<SummaryRow> = state
            .aggregates
            .iter()
            .filter(|(_, record)| record.is_within(retention, now))
            .map(|(name, record)| record.to_row(name))
            .collect();
        rows.sort_by(|a, b| a.function.cmp(&b.function));
        rows
    }

    /// The most recent `limit` samples, oldest first.
    pub fn recent_metrics(&self, limit: usize) -> Vec<MetricSample> {
        self.lock().samples.recent(limit)
    }

    pub fn health_status(&self) -> HealthStatus {
        self.health_status_at(Utc::now())
    }

    pub fn health_status_at(&self, now: DateTime<Utc>) -> HealthStatus {
        let state = self.lock();
        let rows = self.rows(&state, now);
        self.evaluate(&state, &rows, now)
    }

    fn evaluate(&self, state: &RecorderState, rows: &[SummaryRow], now: DateTime<Utc>) -> HealthStatus {
        evaluate(
            rows,
            &state.samples,
            self.environment(),
            self.shared.config.slow_threshold_ms,
            now,
        )
    }

    /// Recent samples, summary and health taken under one lock.
    pub fn export_metrics(&self) -> MetricsExport {
        let now = Utc::now();
        let export = {
            let state = self.lock();
            let summary = self.rows(&state, now);
            let health = self.evaluate(&state, &summary, now);
            MetricsExport {
                recent: state.samples.recent(EXPORT_RECENT_LIMIT),
                summary,
                health,
            }
        };
        metrics::publish_health(&export.health, &export.summary);
        export
    }

    /// Drop all samples and aggregates and cancel a pending sweep.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.samples.clear();
        state.aggregates.clear();
        state.disarm();
        tracing::debug!("Metric recorder reset");
    }
}

fn lock_state(shared: &Shared) -> MutexGuard<'_, RecorderState> {
    shared
        .state
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn sweep_after(shared: Weak<Shared>, generation: u64, interval: Duration) {
    tokio::time::sleep(interval).await;

    let Some(shared) = shared.upgrade() else {
        return;
    };
    let mut state = lock_state(&shared);
    if !matches!(state.sweep, Sweep::Scheduled { generation: armed, .. } if armed == generation) {
        return;
    }
    state.sweep = Sweep::Unarmed;

    let cutoff = Utc::now();
    let removed = state.prune(shared.config.retention(), cutoff);
    tracing::debug!(removed, remaining = state.aggregates.len(), "Aggregate sweep ran");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder(environment: Environment) -> MetricRecorder {
        MetricRecorder::new(RecorderConfig {
            environment,
            ..RecorderConfig::default()
        })
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn minutes_ago(now: DateTime<Utc>, minutes: i64) -> DateTime<Utc> {
        now - chrono::Duration::minutes(minutes)
    }

    #[test]
    fn test_fetch_user_health_example() {
        let rec = recorder(Environment::Development);
        let now = Utc::now();
        for _ in 0..100 {
            rec.record_at(Environment::Development, "fetchUser", ms(12), now, None);
        }

        let rows = rec.summary_at(now);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].function, "fetchUser");
        assert_eq!(rows[0].call_count, 100);
        assert_eq!(rows[0].error_rate, "0.00%");
        assert_eq!(rows[0].avg_duration, 12);
        assert!(rows[0].is_healthy);

        for i in 0..100 {
            let error = (i < 2).then(|| SampleError::new("timeout"));
            rec.record_at(Environment::Development, "fetchUser", ms(12), now, error);
        }
        let rows = rec.summary_at(now);
        assert_eq!(rows[0].call_count, 200);
        assert_eq!(rows[0].error_rate, "1.00%");
        assert!(!rows[0].is_healthy);
        assert!(!rec.health_status_at(now).is_ok());
    }

    #[test]
    fn test_window_exclusion_keeps_storage() {
        let rec = recorder(Environment::Development);
        let now = Utc::now();
        rec.record_at(Environment::Development, "stale", ms(5), minutes_ago(now, 61), None);
        rec.record_at(Environment::Development, "fresh", ms(5), now, None);

        let rows = rec.summary_at(now);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].function, "fresh");
        assert_eq!(rec.aggregate_count(), 2);

        assert_eq!(rec.prune_stale(now), 1);
        assert_eq!(rec.aggregate_count(), 1);
        assert_eq!(rec.sample_count(), 2);
    }

    #[test]
    fn test_synthetic_leak_in_production() {
        let rec = recorder(Environment::Production);
        rec.record("fetchUser", Instant::now(), None);
        assert!(rec.health_status().is_ok());

        let sample = rec.record_in(Environment::Test, "fetchUser", Instant::now(), None);
        assert!(sample.is_synthetic);

        let health = rec.health_status();
        assert!(health.synthetic_leak);
        assert!(!health.is_ok());
        assert!(health.unhealthy_operations.is_empty());
    }

    #[test]
    fn test_slow_operations_and_utilization() {
        let rec = MetricRecorder::new(RecorderConfig {
            capacity: 4,
            ..RecorderConfig::default()
        });
        let now = Utc::now();
        rec.record_at(Environment::Development, "render", ms(51), now, None);
        rec.record_at(Environment::Development, "ping", ms(50), now, None);

        let health = rec.health_status_at(now);
        assert_eq!(health.slow_operations, vec!["render".to_string()]);
        assert_eq!(health.buffer_utilization, "50.00%");
        assert_eq!(health.total_operations, 2);
    }

    #[test]
    fn test_buffer_bound() {
        let rec = MetricRecorder::new(RecorderConfig {
            capacity: 10,
            ..RecorderConfig::default()
        });
        let now = Utc::now();
        for n in 0..25 {
            rec.record_at(Environment::Development, "op", ms(n), now, None);
        }

        let recent = rec.recent_metrics(25);
        assert_eq!(recent.len(), 10);
        let durations: Vec<u64> = recent.iter().map(|s| s.duration_ms).collect();
        assert_eq!(durations, (15..25).collect::<Vec<u64>>());
        assert_eq!(rec.summary_at(now)[0].call_count, 25);
    }

    #[test]
    fn test_error_trace_is_kept() {
        let rec = MetricRecorder::default();
        let sample = rec.record(
            "save",
            Instant::now(),
            Some(SampleError::new("disk full").with_trace("caused by: ENOSPC")),
        );
        assert_eq!(sample.error_message.as_deref(), Some("disk full"));

        let recent = rec.recent_metrics(DEFAULT_RECENT_LIMIT);
        assert_eq!(recent[0].error_trace.as_deref(), Some("caused by: ENOSPC"));
        assert_eq!(rec.summary()[0].error_count, 1);
    }

    #[test]
    fn test_deferred_sweep_without_runtime() {
        let rec = MetricRecorder::new(RecorderConfig {
            prune_interval_secs: 0,
            ..RecorderConfig::default()
        });
        let now = Utc::now();
        rec.record_at(Environment::Development, "old", ms(1), minutes_ago(now, 90), None);
        assert!(rec.sweep_armed());
        assert_eq!(rec.aggregate_count(), 1);

        rec.record_at(Environment::Development, "new", ms(1), now, None);
        assert_eq!(rec.aggregate_count(), 1);
        assert_eq!(rec.summary_at(now)[0].function, "new");
    }

    #[test]
    fn test_sweep_rearms_after_runtime_shutdown() {
        let rec = MetricRecorder::new(RecorderConfig {
            prune_interval_secs: 0,
            ..RecorderConfig::default()
        });
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            rec.record("op", Instant::now(), None);
            assert!(rec.sweep_armed());
        });
        drop(runtime);
        assert!(!rec.sweep_armed());

        let now = Utc::now();
        rec.record_at(Environment::Development, "old", ms(1), minutes_ago(now, 90), None);
        assert!(rec.sweep_armed());
        assert_eq!(rec.aggregate_count(), 2);

        rec.record_at(Environment::Development, "new", ms(1), now, None);
        let names: Vec<String> = rec.summary_at(now).into_iter().map(|r| r.function).collect();
        assert_eq!(names, vec!["new".to_string(), "op".to_string()]);
        assert_eq!(rec.aggregate_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_sweep_fires_once() {
        let rec = MetricRecorder::default();
        let now = Utc::now();
        rec.record_at(Environment::Development, "old", ms(1), minutes_ago(now, 90), None);
        rec.record_at(Environment::Development, "new", ms(1), now, None);
        assert!(rec.sweep_armed());
        assert_eq!(rec.aggregate_count(), 2);

        tokio::time::sleep(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;

        assert!(!rec.sweep_armed());
        assert_eq!(rec.aggregate_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_cancels_sweep() {
        let rec = MetricRecorder::default();
        rec.record("op", Instant::now(), None);
        assert!(rec.sweep_armed());

        rec.reset();
        assert!(!rec.sweep_armed());
        assert_eq!(rec.sample_count(), 0);
        assert_eq!(rec.aggregate_count(), 0);
        assert!(rec.summary().is_empty());

        rec.record("op", Instant::now(), None);
        assert!(rec.sweep_armed());
    }

    #[test]
    fn test_export() {
        let rec = MetricRecorder::default();
        for _ in 0..1200 {
            rec.record("op", Instant::now(), None);
        }
        let export = rec.export_metrics();
        assert_eq!(export.recent.len(), EXPORT_RECENT_LIMIT);
        assert_eq!(export.summary.len(), 1);
        assert!(export.health.is_ok());

        let json = serde_json::to_value(&export).unwrap();
        assert_eq!(json["health"]["status"], "ok");
        assert_eq!(json["summary"][0]["callCount"], 1200);
    }
}
