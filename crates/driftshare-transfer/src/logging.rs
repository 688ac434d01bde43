/// Transfer logging trait for structured lifecycle logs.
///
/// Sender and receiver report what happens to each file through a
/// [`TransferLogger`] so callers can route logs to `tracing`, a test
/// collector, or nowhere.

use std::fmt;

/// Structured log entry for one file.
#[derive(Debug, Clone)]
pub struct TransferLog {
    pub component: &'static str,
    pub file_id: String,
    pub event: TransferEvent,
}

/// Transfer events that can be logged.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferEvent {
    /// Sender: task picked from the queue
    TaskStarted {
        file_name: String,
        size: u64,
        total_chunks: u32,
    },
    /// Sender: one send attempt failed, another will follow
    ChunkRetry {
        chunk_index: u32,
        attempt: u32,
        error: String,
    },
    /// Sender: retry budget exhausted
    ChunkFailed {
        chunk_index: u32,
        attempts: u32,
    },
    /// Sender: every chunk of a window was accepted by the channel
    WindowDispatched {
        first_chunk: u32,
        last_chunk: u32,
        progress: u8,
    },
    /// Sender/Receiver: file done
    TransferComplete {
        total_bytes: u64,
        duration_ms: u64,
    },
    /// Receiver: first chunk of a new file
    ReceptionStarted {
        file_name: String,
        total_chunks: u32,
    },
    /// Receiver: partial reception dropped before completion
    ReceptionDiscarded {
        received: u32,
        total_chunks: u32,
        reason: &'static str,
    },
    /// Receiver: inbound chunk dropped without touching any reception
    ChunkRejected {
        chunk_index: u32,
        reason: String,
    },
    /// Receiver: count reached total with empty slots
    IntegrityFailure {
        missing: Vec<u32>,
    },
    /// Error occurred
    Error {
        message: String,
    },
}

impl fmt::Display for TransferEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TaskStarted { file_name, size, total_chunks } => {
                write!(f, "task_started name={} size={} chunks={}", file_name, size, total_chunks)
            }
            Self::ChunkRetry { chunk_index, attempt, error } => {
                write!(f, "chunk_retry idx={} attempt={} error={}", chunk_index, attempt, error)
            }
            Self::ChunkFailed { chunk_index, attempts } => {
                write!(f, "chunk_failed idx={} attempts={}", chunk_index, attempts)
            }
            Self::WindowDispatched { first_chunk, last_chunk, progress } => {
                write!(f, "window_dispatched idx={}..={} progress={}%", first_chunk, last_chunk, progress)
            }
            Self::TransferComplete { total_bytes, duration_ms } => {
                write!(f, "transfer_complete bytes={} duration_ms={}", total_bytes, duration_ms)
            }
            Self::ReceptionStarted { file_name, total_chunks } => {
                write!(f, "reception_started name={} chunks={}", file_name, total_chunks)
            }
            Self::ReceptionDiscarded { received, total_chunks, reason } => {
                write!(f, "reception_discarded received={}/{} reason={}", received, total_chunks, reason)
            }
            Self::ChunkRejected { chunk_index, reason } => {
                write!(f, "chunk_rejected idx={} reason={}", chunk_index, reason)
            }
            Self::IntegrityFailure { missing } => {
                write!(f, "integrity_failure missing={:?}", missing)
            }
            Self::Error { message } => {
                write!(f, "error: {}", message)
            }
        }
    }
}

/// Trait for transfer logging. Implementations can write to tracing,
/// collect entries, or discard them.
pub trait TransferLogger: Send + Sync {
    fn log(&self, entry: TransferLog);
}

/// Logger that uses the `tracing` crate.
pub struct TracingLogger;

impl TransferLogger for TracingLogger {
    fn log(&self, entry: TransferLog) {
        // Per-chunk events go to debug, lifecycle to info, failures to warn
        match &entry.event {
            TransferEvent::ChunkRetry { .. } | TransferEvent::WindowDispatched { .. } => {
                tracing::debug!(
                    component = entry.component,
                    file_id = %entry.file_id,
                    "{}",
                    entry.event,
                );
            }
            TransferEvent::ChunkFailed { .. }
            | TransferEvent::ReceptionDiscarded { .. }
            | TransferEvent::ChunkRejected { .. }
            | TransferEvent::IntegrityFailure { .. }
            | TransferEvent::Error { .. } => {
                tracing::warn!(
                    component = entry.component,
                    file_id = %entry.file_id,
                    "{}",
                    entry.event,
                );
            }
            _ => {
                tracing::info!(
                    component = entry.component,
                    file_id = %entry.file_id,
                    "{}",
                    entry.event,
                );
            }
        }
    }
}

/// No-op logger that discards all log entries.
pub struct NullLogger;

impl TransferLogger for NullLogger {
    fn log(&self, _entry: TransferLog) {}
}
