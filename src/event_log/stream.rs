//! Incremental reader for large JSON Lines files.
//!
//! # Responsibilities
//! - Read the file in fixed-size chunks
//! - Decode UTF-8 across chunk edges
//! - Yield each complete line as soon as it is available
//!
//! # Design Decisions
//! - The cursor owns the file handle; dropping it closes the file
//! - Fused: after an error or end of input, `next` keeps returning `None`
//! - A trailing line without `\n` is parsed once input ends
//! - Invalid UTF-8 decodes as U+FFFD, the same as `EventLog::read_all`

use futures_util::stream::{self, Stream};
use std::collections::VecDeque;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::config::ReadMode;
use crate::error::{TelemetryError, TelemetryResult};
use crate::event_log::entry::LogEntry;
use crate::event_log::log::parse_line;

/// Default read size.
pub const CHUNK_SIZE: usize = 8 * 1024;

/// Forward-only, single-pass cursor over a log file.
#[derive(Debug)]
pub struct EntryStream {
    path: PathBuf,
    mode: ReadMode,
    file: Option<File>,
    chunk: Vec<u8>,
    /// Bytes of a multi-byte character cut off by the previous chunk.
    undecoded: Vec<u8>,
    carry: String,
    ready: VecDeque<TelemetryResult<LogEntry>>,
    line_no: usize,
    done: bool,
}

impl EntryStream {
    /// Open `path` for streaming. A missing file yields an empty stream.
    pub async fn open(path: impl AsRef<Path>, mode: ReadMode) -> TelemetryResult<Self> {
        Self::open_with_chunk_size(path, mode, CHUNK_SIZE).await
    }

    pub async fn open_with_chunk_size(
        path: impl AsRef<Path>,
        mode: ReadMode,
        chunk_size: usize,
    ) -> TelemetryResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = match File::open(&path).await {
            Ok(file) => Some(file),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(TelemetryError::io(&path, e)),
        };

        Ok(Self {
            path,
            mode,
            done: file.is_none(),
            file,
            chunk: vec![0; chunk_size.max(1)],
            undecoded: Vec::new(),
            carry: String::new(),
            ready: VecDeque::new(),
            line_no: 0,
        })
    }

    /// True while the underlying file handle is held.
    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Release the file handle early. Entries already decoded are still yielded.
    pub fn close(&mut self) {
        self.file = None;
        self.done = true;
    }

    /// Next entry, or `None` once the input is exhausted.
    pub async fn next(&mut self) -> Option<TelemetryResult<LogEntry>> {
        loop {
            if let Some(item) = self.ready.pop_front() {
                return Some(item);
            }
            if self.done {
                return None;
            }

            let Some(file) = self.file.as_mut() else {
                self.done = true;
                return None;
            };

            match file.read(&mut self.chunk).await {
                Ok(0) => self.finish(),
                Ok(n) => {
                    self.undecoded.extend_from_slice(&self.chunk[..n]);
                    decode_utf8(&mut self.undecoded, &mut self.carry);
                    self.drain_lines();
                }
                Err(e) => {
                    self.ready.push_back(Err(TelemetryError::io(&self.path, e)));
                    self.close();
                }
            }
        }
    }

    /// Collect the remaining entries, stopping at the first error.
    pub async fn collect(mut self) -> TelemetryResult<Vec<LogEntry>> {
        let mut entries = Vec::new();
        while let Some(item) = self.next().await {
            entries.push(item?);
        }
        Ok(entries)
    }

    /// Adapt the cursor into a `futures` stream.
    pub fn into_stream(self) -> impl Stream<Item = TelemetryResult<LogEntry>> {
        stream::unfold(self, |mut cursor| async move {
            cursor.next().await.map(|item| (item, cursor))
        })
    }

    fn drain_lines(&mut self) {
        let mut consumed = 0;
        while let Some(rel) = self.carry[consumed..].find('\n') {
            let end = consumed + rel;
            self.line_no += 1;
            let line = self.carry[consumed..end].trim();
            consumed = end + 1;

            if line.is_empty() {
                continue;
            }
            match parse_line(&self.path, self.line_no, line, self.mode) {
                Ok(Some(entry)) => self.ready.push_back(Ok(entry)),
                Ok(None) => {}
                Err(e) => {
                    self.ready.push_back(Err(e));
                    self.carry.clear();
                    self.close();
                    return;
                }
            }
        }
        self.carry.drain(..consumed);
    }

    fn finish(&mut self) {
        if !self.undecoded.is_empty() {
            self.carry.push_str(&String::from_utf8_lossy(&self.undecoded));
            self.undecoded.clear();
        }
        self.drain_lines();

        let rest = std::mem::take(&mut self.carry);
        if !rest.trim().is_empty() && !self.done {
            self.line_no += 1;
            match parse_line(&self.path, self.line_no, rest.trim(), self.mode) {
                Ok(Some(entry)) => self.ready.push_back(Ok(entry)),
                Ok(None) => {}
                Err(e) => self.ready.push_back(Err(e)),
            }
        }
        self.close();
    }
}

/// Move every complete UTF-8 sequence from `pending` into `out`.
///
/// An incomplete sequence at the end stays in `pending` for the next chunk;
/// invalid bytes become U+FFFD.
fn decode_utf8(pending: &mut Vec<u8>, out: &mut String) {
    loop {
        match std::str::from_utf8(pending.as_slice()) {
            Ok(text) => {
                out.push_str(text);
                pending.clear();
                return;
            }
            Err(e) => {
                let valid = e.valid_up_to();
                out.push_str(&String::from_utf8_lossy(&pending[..valid]));
                match e.error_len() {
                    Some(len) => {
                        out.push(char::REPLACEMENT_CHARACTER);
                        pending.drain(..valid + len);
                    }
                    None => {
                        pending.drain(..valid);
                        return;
                    }
                }
            }
        }
    }
}
