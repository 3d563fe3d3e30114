//! Durable event log subsystem.
//!
//! # Data Flow
//! ```text
//! Caller
//!     → log.rs (EventLog::log: fill timestamp, serialize, buffer)
//!     → flush on > flush_max_bytes or > flush_max_entries, or on request
//!     → single append-mode write to the target file (JSON Lines)
//!
//! Shared use:
//!     writer.rs (EventLogHandle clones → mpsc → one task owning EventLog)
//!
//! Readers:
//!     → log.rs (read_all, query_by_device, query_by_event, latest)
//!     → stream.rs (EntryStream: chunked, incremental, owns the file handle)
//! ```
//!
//! # Design Decisions
//! - One writer per file: `&mut self` or the writer task, never both
//! - Missing file reads as empty, malformed lines fail the read unless lax
//! - No retries: failures go back to the caller with the buffer intact

pub mod entry;
pub mod log;
pub mod stream;
pub mod writer;

pub use entry::LogEntry;
pub use log::EventLog;
pub use stream::EntryStream;
pub use writer::EventLogHandle;
