//! Shared utilities for integration tests.

use serde_json::json;
use std::path::PathBuf;
use tempfile::TempDir;
use telemetry_pipeline::LogEntry;

/// A temporary directory and a log path inside it. Keep the `TempDir` alive.
pub fn temp_log() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.jsonl");
    (dir, path)
}

/// A varied set of entries: nested values, unicode, explicit and missing timestamps.
pub fn sample_entries(n: usize) -> Vec<LogEntry> {
    (0..n)
        .map(|i| {
            let mut entry = LogEntry::new(format!("device-{}", i % 4), ["boot", "sync", "crash"][i % 3])
                .with_field("seq", i)
                .with_field("label", format!("ünïcødé-{}-日本", i))
                .with_field("meta", json!({"ok": i % 5 != 0, "tags": ["a", i], "ratio": 0.25}));
            if i % 2 == 0 {
                entry = entry.with_timestamp("2024-05-01T12:00:00.000Z");
            }
            entry
        })
        .collect()
}
