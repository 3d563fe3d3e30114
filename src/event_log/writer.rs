//! Dedicated writer task for shared event logs.
//!
//! # Responsibilities
//! - Own the `EventLog` on a single task
//! - Accept entries from any number of cloned handles
//! - Report every result, automatic flushes included, back to the requester
//!
//! # Design Decisions
//! - Bounded channel: producers wait when the writer falls behind
//! - Every command carries a oneshot reply; `handle.log` behaves like `EventLog::log`
//! - Dropping the last handle flushes and stops the task

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{TelemetryError, TelemetryResult};
use crate::event_log::entry::LogEntry;
use crate::event_log::log::EventLog;

const CHANNEL_CAPACITY: usize = 1024;

type Reply = oneshot::Sender<TelemetryResult<()>>;

enum Command {
    Log(LogEntry, Reply),
    Flush(Reply),
    Close(Reply),
}

/// Cloneable front end to a spawned `EventLog`.
#[derive(Clone)]
pub struct EventLogHandle {
    tx: mpsc::Sender<Command>,
}

impl EventLogHandle {
    /// Hand an entry to the writer and wait until it is buffered.
    ///
    /// Returns the automatic flush error if this entry triggered one; the
    /// entry is then not kept and may be retried.
    pub async fn log(&self, entry: LogEntry) -> TelemetryResult<()> {
        self.request(|reply| Command::Log(entry, reply)).await
    }

    /// Flush everything queued before this call.
    pub async fn flush(&self) -> TelemetryResult<()> {
        self.request(Command::Flush).await
    }

    /// Flush and stop the writer. Other handles see `WriterClosed` afterwards.
    pub async fn close(self) -> TelemetryResult<()> {
        self.request(Command::Close).await
    }

    async fn request(&self, make: impl FnOnce(Reply) -> Command) -> TelemetryResult<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| TelemetryError::WriterClosed)?;
        reply_rx.await.map_err(|_| TelemetryError::WriterClosed)?
    }
}

impl EventLog {
    /// Move the log onto its own task and return a handle to it.
    pub fn spawn(self) -> (EventLogHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let task = tokio::spawn(run_writer(self, rx));
        (EventLogHandle { tx }, task)
    }
}

async fn run_writer(mut log: EventLog, mut rx: mpsc::Receiver<Command>) {
    tracing::debug!(path = %log.path().display(), "Event log writer started");

    while let Some(command) = rx.recv().await {
        match command {
            Command::Log(entry, reply) => {
                let result = log.log(entry).await;
                if let Err(e) = &result {
                    tracing::warn!(
                        path = %log.path().display(),
                        error = %e,
                        pending = log.pending_entries(),
                        "Entry rejected"
                    );
                }
                let _ = reply.send(result);
            }
            Command::Flush(reply) => {
                let _ = reply.send(log.flush().await);
            }
            Command::Close(reply) => {
                let _ = reply.send(log.flush().await);
                tracing::debug!(path = %log.path().display(), "Event log writer closed");
                return;
            }
        }
    }

    if let Err(e) = log.flush().await {
        tracing::error!(path = %log.path().display(), error = %e, "Final flush failed");
    }
    tracing::debug!(path = %log.path().display(), "Event log writer stopped");
}
