//! Receiver side: collect chunks into slots until a file is whole.
//!
//! Chunks may arrive in any order, including interleaved across files: the
//! sender moves on to the next file once the channel has accepted the
//! previous one, not once it has arrived. Receptions are keyed by file id
//! and name, and keys that already finished are remembered for a while so
//! a late duplicate is dropped instead of starting a phantom reception.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use bytes::Bytes;
use driftshare_types::ChunkMessage;
use tokio::time::Instant;

use crate::codec;
use crate::error::ReassemblyError;
use crate::logging::{TracingLogger, TransferEvent, TransferLog, TransferLogger};
use crate::protocol::{
    CHUNK_SIZE, FINISHED_HISTORY_LEN, MAX_CONCURRENT_RECEPTIONS, MAX_TOTAL_CHUNKS,
};
use crate::throughput::ThroughputEstimator;

/// A fully reassembled file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFile {
    pub file_id: String,
    pub file_name: String,
    pub file_type: String,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReceptionOutcome {
    /// Chunk stored, more expected.
    Progress {
        file_id: String,
        received: u32,
        total_chunks: u32,
        progress: u8,
        /// Set when the smoothed speed changed.
        speed: Option<f64>,
    },
    Completed(ReceivedFile),
    /// Count reached the total but some slots stayed empty.
    Failed {
        file_id: String,
        file_name: String,
        missing: Vec<u32>,
    },
}

/// Bounds on what a peer may ask the receiver to hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReassemblyLimits {
    /// Largest accepted `totalChunks`.
    pub max_total_chunks: u32,
    /// Largest accepted chunk payload in bytes.
    pub max_chunk_len: usize,
    /// Receptions kept side by side.
    pub max_receptions: usize,
}

impl Default for ReassemblyLimits {
    fn default() -> Self {
        Self {
            max_total_chunks: MAX_TOTAL_CHUNKS,
            max_chunk_len: CHUNK_SIZE,
            max_receptions: MAX_CONCURRENT_RECEPTIONS,
        }
    }
}

type ReceptionKey = (String, String);

fn key_of(msg: &ChunkMessage) -> ReceptionKey {
    (msg.file_id.clone(), msg.file_name.clone())
}

#[derive(Debug)]
struct ReceptionState {
    file_id: String,
    file_name: String,
    file_type: String,
    total_chunks: u32,
    received: u32,
    received_bytes: u64,
    slots: Vec<Option<Bytes>>,
    started: Instant,
    last_chunk: Instant,
}

impl ReceptionState {
    /// Callers bound `total_chunks` before this allocates.
    fn new(msg: &ChunkMessage) -> Self {
        let now = Instant::now();
        Self {
            file_id: msg.file_id.clone(),
            file_name: msg.file_name.clone(),
            file_type: msg.file_type.clone(),
            total_chunks: msg.total_chunks,
            received: 0,
            received_bytes: 0,
            slots: vec![None; msg.total_chunks as usize],
            started: now,
            last_chunk: now,
        }
    }
}

pub struct ReassemblyBuffer {
    receptions: HashMap<ReceptionKey, ReceptionState>,
    finished: VecDeque<ReceptionKey>,
    limits: ReassemblyLimits,
    estimator: ThroughputEstimator,
    logger: Arc<dyn TransferLogger>,
}

impl Default for ReassemblyBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl ReassemblyBuffer {
    pub fn new() -> Self {
        Self {
            receptions: HashMap::new(),
            finished: VecDeque::new(),
            limits: ReassemblyLimits::default(),
            estimator: ThroughputEstimator::new(),
            logger: Arc::new(TracingLogger),
        }
    }

    pub fn with_logger(mut self, logger: Arc<dyn TransferLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_limits(mut self, limits: ReassemblyLimits) -> Self {
        self.limits = ReassemblyLimits {
            max_receptions: limits.max_receptions.max(1),
            ..limits
        };
        self
    }

    /// Number of files currently being assembled.
    pub fn active_count(&self) -> usize {
        self.receptions.len()
    }

    /// Whether a reception for `file_id` is in progress.
    pub fn is_receiving(&self, file_id: &str) -> bool {
        self.receptions.keys().any(|(id, _)| id == file_id)
    }

    /// Apply one inbound chunk.
    ///
    /// A rejected chunk is logged and leaves every reception untouched.
    /// Duplicates overwrite their slot but still count towards the total,
    /// so a duplicate can end a reception with an integrity failure.
    pub fn on_chunk(&mut self, msg: ChunkMessage) -> Result<ReceptionOutcome, ReassemblyError> {
        let file_id = msg.file_id.clone();
        let chunk_index = msg.chunk_index;

        let result = self.apply(msg);
        if let Err(e) = &result {
            self.log(&file_id, TransferEvent::ChunkRejected {
                chunk_index,
                reason: e.to_string(),
            });
        }
        result
    }

    /// Drop every reception in progress, e.g. because the channel closed.
    pub fn abort(&mut self) {
        let receptions: Vec<_> = self.receptions.drain().map(|(_, state)| state).collect();
        for state in receptions {
            self.discard(state, "channel_closed");
        }
    }

    fn apply(&mut self, msg: ChunkMessage) -> Result<ReceptionOutcome, ReassemblyError> {
        self.validate(&msg)?;

        let key = key_of(&msg);
        if self.finished.contains(&key) {
            return Err(ReassemblyError::AlreadyFinished);
        }

        let mut state = match self.receptions.remove(&key) {
            Some(state) => {
                if state.total_chunks != msg.total_chunks {
                    let err = ReassemblyError::TotalMismatch {
                        expected: state.total_chunks,
                        got: msg.total_chunks,
                    };
                    self.receptions.insert(key, state);
                    return Err(err);
                }
                state
            }
            None => {
                self.make_room();
                self.begin(&msg)
            }
        };

        state.received_bytes += msg.chunk.len() as u64;
        state.received += 1;
        state.last_chunk = Instant::now();
        state.slots[msg.chunk_index as usize] = Some(msg.chunk);

        if state.received < state.total_chunks {
            let progress =
                ((state.received as f64 / state.total_chunks as f64) * 100.0).round() as u8;
            let outcome = ReceptionOutcome::Progress {
                file_id: state.file_id.clone(),
                received: state.received,
                total_chunks: state.total_chunks,
                progress,
                speed: self.estimator.sample(&state.file_id, state.received_bytes),
            };
            self.receptions.insert(key, state);
            return Ok(outcome);
        }

        self.remember_finished(key);
        Ok(self.complete(state))
    }

    fn validate(&self, msg: &ChunkMessage) -> Result<(), ReassemblyError> {
        if msg.total_chunks == 0 {
            return Err(ReassemblyError::EmptyTransfer);
        }
        if msg.total_chunks > self.limits.max_total_chunks {
            return Err(ReassemblyError::TooManyChunks {
                total: msg.total_chunks,
                max: self.limits.max_total_chunks,
            });
        }
        if msg.chunk_index >= msg.total_chunks {
            return Err(ReassemblyError::IndexOutOfRange {
                index: msg.chunk_index,
                total: msg.total_chunks,
            });
        }
        if msg.chunk.len() > self.limits.max_chunk_len {
            return Err(ReassemblyError::ChunkTooLarge {
                len: msg.chunk.len(),
                max: self.limits.max_chunk_len,
            });
        }
        Ok(())
    }

    /// Evict the reception idle the longest until a new one fits.
    fn make_room(&mut self) {
        while self.receptions.len() >= self.limits.max_receptions {
            let stalest = self
                .receptions
                .iter()
                .min_by_key(|(_, state)| state.last_chunk)
                .map(|(key, _)| key.clone());
            let Some(key) = stalest else { break };
            if let Some(state) = self.receptions.remove(&key) {
                self.discard(state, "evicted");
            }
        }
    }

    fn remember_finished(&mut self, key: ReceptionKey) {
        if self.finished.len() >= FINISHED_HISTORY_LEN {
            self.finished.pop_front();
        }
        self.finished.push_back(key);
    }

    fn begin(&mut self, msg: &ChunkMessage) -> ReceptionState {
        let state = ReceptionState::new(msg);
        self.estimator.sample(&state.file_id, 0);
        self.log(&state.file_id, TransferEvent::ReceptionStarted {
            file_name: state.file_name.clone(),
            total_chunks: state.total_chunks,
        });
        state
    }

    fn discard(&mut self, state: ReceptionState, reason: &'static str) {
        self.estimator.dispose(&state.file_id);
        self.log(&state.file_id, TransferEvent::ReceptionDiscarded {
            received: state.received,
            total_chunks: state.total_chunks,
            reason,
        });
    }

    fn complete(&mut self, state: ReceptionState) -> ReceptionOutcome {
        self.estimator.dispose(&state.file_id);

        match codec::reassemble(&state.slots) {
            Ok(data) => {
                self.log(&state.file_id, TransferEvent::TransferComplete {
                    total_bytes: data.len() as u64,
                    duration_ms: state.started.elapsed().as_millis() as u64,
                });
                ReceptionOutcome::Completed(ReceivedFile {
                    file_id: state.file_id,
                    file_name: state.file_name,
                    file_type: state.file_type,
                    data,
                })
            }
            Err(_) => {
                let missing = codec::missing_slots(&state.slots);
                self.log(&state.file_id, TransferEvent::IntegrityFailure {
                    missing: missing.clone(),
                });
                ReceptionOutcome::Failed {
                    file_id: state.file_id,
                    file_name: state.file_name,
                    missing,
                }
            }
        }
    }

    fn log(&self, file_id: &str, event: TransferEvent) {
        self.logger.log(TransferLog {
            component: "receiver",
            file_id: file_id.to_string(),
            event,
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::logging::NullLogger;

    fn buffer() -> ReassemblyBuffer {
        ReassemblyBuffer::new().with_logger(Arc::new(NullLogger))
    }

    fn msg(file_id: &str, index: u32, total: u32, data: &[u8]) -> ChunkMessage {
        ChunkMessage {
            file_id: file_id.into(),
            file_name: format!("{file_id}.bin"),
            file_type: "application/octet-stream".into(),
            chunk: Bytes::copy_from_slice(data),
            chunk_index: index,
            total_chunks: total,
        }
    }

    fn completed(outcome: ReceptionOutcome) -> ReceivedFile {
        match outcome {
            ReceptionOutcome::Completed(file) => file,
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[derive(Default)]
    struct CollectLogger(Mutex<Vec<TransferEvent>>);

    impl TransferLogger for CollectLogger {
        fn log(&self, entry: TransferLog) {
            self.0.lock().unwrap().push(entry.event);
        }
    }

    #[tokio::test]
    async fn out_of_order_chunks_complete_the_file() {
        let mut buf = buffer();

        let out = buf.on_chunk(msg("f", 2, 3, b"ef")).unwrap();
        assert!(matches!(out, ReceptionOutcome::Progress { received: 1, progress: 33, .. }));
        let out = buf.on_chunk(msg("f", 0, 3, b"ab")).unwrap();
        assert!(matches!(out, ReceptionOutcome::Progress { received: 2, progress: 67, .. }));

        let file = completed(buf.on_chunk(msg("f", 1, 3, b"cd")).unwrap());
        assert_eq!(file.data.as_ref(), b"abcdef");
        assert_eq!(file.file_name, "f.bin");
        assert_eq!(buf.active_count(), 0);
    }

    #[tokio::test]
    async fn duplicate_index_ends_in_integrity_failure() {
        let mut buf = buffer();
        buf.on_chunk(msg("f", 0, 3, b"a")).unwrap();
        buf.on_chunk(msg("f", 0, 3, b"a")).unwrap();

        let out = buf.on_chunk(msg("f", 2, 3, b"c")).unwrap();
        assert_eq!(
            out,
            ReceptionOutcome::Failed {
                file_id: "f".into(),
                file_name: "f.bin".into(),
                missing: vec![1],
            }
        );
        assert_eq!(buf.active_count(), 0);
    }

    #[tokio::test]
    async fn invalid_chunks_are_rejected_without_touching_state() {
        let mut buf = buffer();
        buf.on_chunk(msg("f", 0, 2, b"a")).unwrap();

        assert_eq!(
            buf.on_chunk(msg("f", 5, 2, b"x")),
            Err(ReassemblyError::IndexOutOfRange { index: 5, total: 2 })
        );
        assert_eq!(
            buf.on_chunk(msg("f", 1, 3, b"x")),
            Err(ReassemblyError::TotalMismatch { expected: 2, got: 3 })
        );
        assert_eq!(buf.on_chunk(msg("g", 0, 0, b"")), Err(ReassemblyError::EmptyTransfer));
        assert_eq!(buf.active_count(), 1);
        assert!(buf.is_receiving("f"));

        let file = completed(buf.on_chunk(msg("f", 1, 2, b"b")).unwrap());
        assert_eq!(file.data.as_ref(), b"ab");
    }

    #[tokio::test]
    async fn interleaved_files_both_complete() {
        let mut buf = buffer();
        buf.on_chunk(msg("a", 0, 2, b"a0")).unwrap();
        buf.on_chunk(msg("b", 0, 2, b"b0")).unwrap();
        assert_eq!(buf.active_count(), 2);

        let a = completed(buf.on_chunk(msg("a", 1, 2, b"a1")).unwrap());
        let b = completed(buf.on_chunk(msg("b", 1, 2, b"b1")).unwrap());
        assert_eq!(a.data.as_ref(), b"a0a1");
        assert_eq!(b.data.as_ref(), b"b0b1");
        assert_eq!(buf.active_count(), 0);
    }

    #[tokio::test]
    async fn late_duplicate_of_finished_file_is_dropped() {
        let mut buf = buffer();
        buf.on_chunk(msg("a", 0, 2, b"a0")).unwrap();
        completed(buf.on_chunk(msg("a", 1, 2, b"a1")).unwrap());
        buf.on_chunk(msg("b", 0, 2, b"b0")).unwrap();

        assert_eq!(
            buf.on_chunk(msg("a", 1, 2, b"a1")),
            Err(ReassemblyError::AlreadyFinished)
        );
        assert!(!buf.is_receiving("a"));

        let b = completed(buf.on_chunk(msg("b", 1, 2, b"b1")).unwrap());
        assert_eq!(b.data.as_ref(), b"b0b1");
    }

    #[tokio::test(start_paused = true)]
    async fn idle_reception_is_evicted_when_full() {
        let mut buf = buffer().with_limits(ReassemblyLimits {
            max_receptions: 2,
            ..ReassemblyLimits::default()
        });
        buf.on_chunk(msg("a", 0, 2, b"a")).unwrap();
        tokio::time::advance(Duration::from_millis(10)).await;
        buf.on_chunk(msg("b", 0, 2, b"b")).unwrap();
        tokio::time::advance(Duration::from_millis(10)).await;
        buf.on_chunk(msg("a", 1, 3, b"x")).unwrap_err();
        buf.on_chunk(msg("c", 0, 2, b"c")).unwrap();

        assert_eq!(buf.active_count(), 2);
        assert!(!buf.is_receiving("a"));
        assert!(buf.is_receiving("b"));
        assert!(buf.is_receiving("c"));
    }

    #[tokio::test]
    async fn oversized_transfers_are_rejected_before_allocating() {
        let mut buf = buffer();
        assert_eq!(
            buf.on_chunk(msg("x", 0, u32::MAX, b"z")),
            Err(ReassemblyError::TooManyChunks {
                total: u32::MAX,
                max: MAX_TOTAL_CHUNKS,
            })
        );

        let big = vec![0u8; CHUNK_SIZE + 1];
        assert_eq!(
            buf.on_chunk(msg("y", 0, 2, &big)),
            Err(ReassemblyError::ChunkTooLarge {
                len: CHUNK_SIZE + 1,
                max: CHUNK_SIZE,
            })
        );
        assert_eq!(buf.active_count(), 0);
    }

    #[tokio::test]
    async fn rejected_chunk_goes_through_logger() {
        let logger = Arc::new(CollectLogger::default());
        let mut buf = ReassemblyBuffer::new().with_logger(logger.clone());

        buf.on_chunk(msg("f", 7, 2, b"x")).unwrap_err();

        let events = logger.0.lock().unwrap();
        assert_eq!(
            *events,
            vec![TransferEvent::ChunkRejected {
                chunk_index: 7,
                reason: "chunk index 7 out of range for 2 chunks".into(),
            }]
        );
    }

    #[tokio::test]
    async fn abort_discards_every_partial_reception() {
        let mut buf = buffer();
        buf.on_chunk(msg("f", 0, 2, b"a")).unwrap();
        buf.on_chunk(msg("g", 0, 2, b"b")).unwrap();
        buf.abort();
        assert_eq!(buf.active_count(), 0);

        // The next chunk starts over.
        let out = buf.on_chunk(msg("f", 1, 2, b"b")).unwrap();
        assert!(matches!(out, ReceptionOutcome::Progress { received: 1, .. }));
    }

    #[tokio::test]
    async fn single_chunk_file_completes_immediately() {
        let mut buf = buffer();
        let file = completed(buf.on_chunk(msg("f", 0, 1, b"solo")).unwrap());
        assert_eq!(file.data.as_ref(), b"solo");
    }
}
