//! Buffered JSON Lines event log.
//!
//! # Responsibilities
//! - Buffer serialized entries in memory
//! - Flush on size/count thresholds or on request
//! - Read the file back in bulk, filtered, or as a stream
//!
//! # Design Decisions
//! - Flush is a single append-mode write, never read-modify-write
//! - `&mut self` on the write path: one writer per instance
//! - Buffer is cleared only after the write succeeded
//! - A `log` call that fails leaves nothing of its entry buffered, so the
//!   buffer never exceeds the flush thresholds between calls
//! - Both readers decode invalid UTF-8 as U+FFFD

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::config::{EventLogConfig, ReadMode};
use crate::error::{TelemetryError, TelemetryResult};
use crate::event_log::entry::{now_timestamp, LogEntry};
use crate::event_log::stream::EntryStream;

/// Pending serialized lines waiting for the next flush.
#[derive(Debug, Default)]
struct PendingBuffer {
    data: String,
    entries: usize,
}

impl PendingBuffer {
    fn push(&mut self, line: &str) {
        self.data.push_str(line);
        self.entries += 1;
    }

    /// Undo the last `push` of `line`.
    fn pop(&mut self, line: &str) {
        self.data.truncate(self.data.len() - line.len());
        self.entries -= 1;
    }

    fn is_empty(&self) -> bool {
        self.entries == 0
    }

    fn clear(&mut self) {
        self.data.clear();
        self.entries = 0;
    }
}

/// Append-only event log bound to one target file.
#[derive(Debug)]
pub struct EventLog {
    path: PathBuf,
    max_bytes: usize,
    max_entries: usize,
    read_mode: ReadMode,
    pending: PendingBuffer,
}

impl EventLog {
    /// Create a log for `path` with the default thresholds.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_config(EventLogConfig {
            path: path.into(),
            ..EventLogConfig::default()
        })
    }

    pub fn with_config(config: EventLogConfig) -> Self {
        Self {
            path: config.path,
            max_bytes: config.flush_max_bytes,
            max_entries: config.flush_max_entries,
            read_mode: config.read_mode,
            pending: PendingBuffer::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read_mode(&self) -> ReadMode {
        self.read_mode
    }

    /// Number of entries buffered since the last flush.
    pub fn pending_entries(&self) -> usize {
        self.pending.entries
    }

    /// Bytes buffered since the last flush.
    pub fn pending_bytes(&self) -> usize {
        self.pending.data.len()
    }

    /// Buffer an entry, flushing if a threshold is exceeded.
    ///
    /// A missing timestamp is filled with the current time. If the automatic
    /// flush fails the error is returned and this entry is dropped from the
    /// buffer again; entries from earlier calls stay pending.
    pub async fn log(&mut self, mut entry: LogEntry) -> TelemetryResult<()> {
        entry.normalize();
        if entry.timestamp.is_none() {
            entry.timestamp = Some(now_timestamp());
        }
        let line = entry.to_line()?;
        self.pending.push(&line);

        if self.should_flush() {
            tracing::debug!(
                path = %self.path.display(),
                entries = self.pending.entries,
                bytes = self.pending.data.len(),
                "Flush threshold reached"
            );
            if let Err(e) = self.flush().await {
                self.pending.pop(&line);
                return Err(e);
            }
        }
        Ok(())
    }

    fn should_flush(&self) -> bool {
        self.pending.data.len() > self.max_bytes || self.pending.entries > self.max_entries
    }

    /// Append all buffered lines to the file. No-op when nothing is buffered.
    pub async fn flush(&mut self) -> TelemetryResult<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| TelemetryError::io(parent, e))?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| TelemetryError::io(&self.path, e))?;
        file.write_all(self.pending.data.as_bytes())
            .await
            .map_err(|e| TelemetryError::io(&self.path, e))?;
        file.flush()
            .await
            .map_err(|e| TelemetryError::io(&self.path, e))?;

        tracing::trace!(
            path = %self.path.display(),
            entries = self.pending.entries,
            "Event log flushed"
        );
        self.pending.clear();
        Ok(())
    }

    /// Read every persisted entry in file order.
    pub async fn read_all(&self) -> TelemetryResult<Vec<LogEntry>> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(TelemetryError::io(&self.path, e)),
        };
        parse_lines(&self.path, &String::from_utf8_lossy(&bytes), self.read_mode)
    }

    /// Open a lazy, single-pass cursor over the persisted entries.
    pub async fn stream(&self) -> TelemetryResult<EntryStream> {
        EntryStream::open(&self.path, self.read_mode).await
    }

    pub async fn query_by_device(&self, device_id: &str) -> TelemetryResult<Vec<LogEntry>> {
        let mut entries = self.read_all().await?;
        entries.retain(|e| e.device_id == device_id);
        Ok(entries)
    }

    pub async fn query_by_event(&self, event: &str) -> TelemetryResult<Vec<LogEntry>> {
        let mut entries = self.read_all().await?;
        entries.retain(|e| e.event == event);
        Ok(entries)
    }

    /// The last `n` entries in file order.
    pub async fn latest(&self, n: usize) -> TelemetryResult<Vec<LogEntry>> {
        let mut entries = self.read_all().await?;
        let start = entries.len().saturating_sub(n);
        Ok(entries.split_off(start))
    }
}

impl Drop for EventLog {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            tracing::warn!(
                path = %self.path.display(),
                entries = self.pending.entries,
                "Event log dropped with unflushed entries"
            );
        }
    }
}

/// Parse one line, applying the read mode. `Ok(None)` means the line was skipped.
pub(crate) fn parse_line(
    path: &Path,
    line_no: usize,
    line: &str,
    mode: ReadMode,
) -> TelemetryResult<Option<LogEntry>> {
    match serde_json::from_str::<LogEntry>(line) {
        Ok(entry) => Ok(Some(entry)),
        Err(source) => match mode {
            ReadMode::Strict => Err(TelemetryError::MalformedEntry {
                path: path.to_path_buf(),
                line: line_no,
                source,
            }),
            ReadMode::Lax => {
                tracing::warn!(
                    path = %path.display(),
                    line = line_no,
                    error = %source,
                    "Skipping malformed log line"
                );
                Ok(None)
            }
        },
    }
}

fn parse_lines(path: &Path, content: &str, mode: ReadMode) -> TelemetryResult<Vec<LogEntry>> {
    let mut entries = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        if let Some(entry) = parse_line(path, idx + 1, line, mode)? {
            entries.push(entry);
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn entry(i: usize) -> LogEntry {
        LogEntry::new(format!("dev-{}", i % 3), "tick").with_field("seq", i)
    }

    #[tokio::test]
    async fn test_flushes_after_entry_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = EventLog::new(dir.path().join("events.jsonl"));

        for i in 0..100 {
            log.log(entry(i)).await.unwrap();
        }
        assert_eq!(log.pending_entries(), 100);
        assert!(!log.path().exists());

        log.log(entry(100)).await.unwrap();
        assert_eq!(log.pending_entries(), 0);
        assert_eq!(log.read_all().await.unwrap().len(), 101);
    }

    /// An entry whose serialized line is exactly `line_len` bytes.
    fn sized_entry(line_len: usize) -> LogEntry {
        let make = |payload: String| {
            LogEntry::new("d", "big")
                .with_timestamp("2024-05-01T12:00:00.000Z")
                .with_field("p", payload)
        };
        let base = make(String::new()).to_line().unwrap().len();
        make("x".repeat(line_len - base))
    }

    #[tokio::test]
    async fn test_byte_threshold_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let limit = 64 * 1024;

        let mut at_limit = EventLog::new(dir.path().join("at-limit.jsonl"));
        at_limit.log(sized_entry(limit / 2)).await.unwrap();
        at_limit.log(sized_entry(limit / 2)).await.unwrap();
        assert_eq!(at_limit.pending_bytes(), 65_536);
        assert_eq!(at_limit.pending_entries(), 2);
        assert!(!at_limit.path().exists());

        let mut over_limit = EventLog::new(dir.path().join("over-limit.jsonl"));
        over_limit.log(sized_entry(limit / 2)).await.unwrap();
        assert!(!over_limit.path().exists());
        over_limit.log(sized_entry(limit / 2 + 1)).await.unwrap();
        assert_eq!(over_limit.pending_entries(), 0);
        assert_eq!(std::fs::metadata(over_limit.path()).unwrap().len(), 65_537);
        assert_eq!(over_limit.read_all().await.unwrap().len(), 2);

        at_limit.flush().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_flush_rejects_entry_without_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        std::fs::create_dir(&path).unwrap();
        let mut log = EventLog::with_config(EventLogConfig {
            path: path.clone(),
            flush_max_entries: 3,
            ..EventLogConfig::default()
        });

        for i in 0..3 {
            log.log(entry(i)).await.unwrap();
        }
        for _ in 0..10 {
            assert!(matches!(log.log(entry(3)).await, Err(TelemetryError::Io { .. })));
            assert_eq!(log.pending_entries(), 3);
        }
        let pending = log.pending_bytes();
        assert!(log.flush().await.is_err());
        assert_eq!(log.pending_bytes(), pending);

        std::fs::remove_dir(&path).unwrap();
        log.log(entry(3)).await.unwrap();
        assert_eq!(log.pending_entries(), 0);

        let seqs: Vec<Value> = log
            .read_all()
            .await
            .unwrap()
            .iter()
            .filter_map(|e| e.field("seq").cloned())
            .collect();
        assert_eq!(seqs, vec![json!(0), json!(1), json!(2), json!(3)]);
    }

    #[tokio::test]
    async fn test_reserved_field_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = EventLog::new(dir.path().join("events.jsonl"));

        log.log(LogEntry::new("d", "sync").with_field("event", "override")).await.unwrap();
        let mut raw = LogEntry::new("d", "sync");
        raw.fields.insert("deviceId".into(), json!("other"));
        raw.fields.insert("timestamp".into(), json!("2024-05-01T12:00:00.000Z"));
        log.log(raw).await.unwrap();
        log.flush().await.unwrap();

        let entries = log.read_all().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].event, "override");
        assert!(entries[0].fields.is_empty());
        assert_eq!(entries[1].device_id, "other");
        assert_eq!(entries[1].timestamp.as_deref(), Some("2024-05-01T12:00:00.000Z"));
        assert_eq!(log.stream().await.unwrap().collect().await.unwrap(), entries);
    }

    #[tokio::test]
    async fn test_empty_flush_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("events.jsonl");
        let mut log = EventLog::new(&path);

        log.flush().await.unwrap();
        assert!(!path.exists());
        assert!(!dir.path().join("nested").exists());
    }

    #[tokio::test]
    async fn test_flush_appends_to_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        std::fs::write(&path, "{\"deviceId\":\"old\",\"event\":\"seed\"}\n").unwrap();

        let mut log = EventLog::new(&path);
        log.log(LogEntry::new("new", "boot")).await.unwrap();
        log.flush().await.unwrap();

        let entries = log.read_all().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].device_id, "old");
        assert_eq!(entries[1].device_id, "new");
        assert!(entries[1].timestamp.is_some());
    }

    #[tokio::test]
    async fn test_missing_file_reads_empty() {
        let log = EventLog::new("/nonexistent/dir/events.jsonl");
        assert!(log.read_all().await.unwrap().is_empty());
        assert!(log.query_by_device("x").await.unwrap().is_empty());
        assert!(log.latest(5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_strict_and_lax_modes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        std::fs::write(
            &path,
            "{\"deviceId\":\"a\",\"event\":\"x\"}\nnot json\n\n{\"deviceId\":\"b\",\"event\":\"y\"}\n",
        )
        .unwrap();

        let strict = EventLog::new(&path);
        match strict.read_all().await {
            Err(TelemetryError::MalformedEntry { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected malformed entry, got {:?}", other),
        }

        let lax = EventLog::with_config(EventLogConfig {
            path: path.clone(),
            read_mode: ReadMode::Lax,
            ..EventLogConfig::default()
        });
        let entries = lax.read_all().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].device_id, "b");
    }

    #[tokio::test]
    async fn test_queries() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = EventLog::new(dir.path().join("events.jsonl"));
        for i in 0..9 {
            log.log(entry(i)).await.unwrap();
        }
        log.log(LogEntry::new("dev-0", "shutdown")).await.unwrap();
        log.flush().await.unwrap();

        let dev0 = log.query_by_device("dev-0").await.unwrap();
        assert_eq!(dev0.len(), 4);
        assert!(dev0.iter().all(|e| e.device_id == "dev-0"));

        assert_eq!(log.query_by_event("shutdown").await.unwrap().len(), 1);
        assert!(log.query_by_event("shut").await.unwrap().is_empty());

        let latest = log.latest(2).await.unwrap();
        assert_eq!(latest[0].field("seq"), Some(&json!(8)));
        assert_eq!(latest[1].event, "shutdown");

        assert_eq!(log.latest(50).await.unwrap().len(), 10);
        assert!(log.latest(0).await.unwrap().is_empty());
    }
}
