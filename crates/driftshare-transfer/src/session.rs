/// Sender side: a FIFO queue of files pushed through one data channel.
///
/// ```text
/// queue: [file A][file B][file C]      one file at a time
///
/// file A: [0 1 2][3 4 5][6 7 8][9]     windows of W chunks
///          └─ all sends issued, then joined; a window that fails
///             permanently fails the task and stops the queue
/// ```
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use driftshare_types::{ChannelMessage, ChunkMessage};
use futures_util::future::try_join_all;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::channel::DataChannel;
use crate::codec;
use crate::error::{ChannelError, TransferError};
use crate::logging::{TracingLogger, TransferEvent, TransferLog, TransferLogger};
use crate::protocol::*;
use crate::task::{FileTransferTask, SourceFile, TaskSnapshot, TransferStatus};
use crate::throughput::ThroughputEstimator;

/// Snapshots buffered per subscriber before it starts lagging.
const UPDATE_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Chunks in flight per window.
    pub window: usize,
    /// Attempts after the first failed send of a chunk.
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub chunk_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            chunk_size: CHUNK_SIZE,
        }
    }
}

/// Coarse state shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Sending,
    Sent,
    Failed,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Sending => "Sending file...",
            Self::Sent => "File sent",
            Self::Failed => "Transfer failed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub struct TaskFailure {
    pub task_id: String,
    pub error: TransferError,
}

/// Outcome of one [`TransferSession::run`].
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Tasks that completed during this run.
    pub completed: usize,
    /// The task that stopped the run, if any.
    pub failed: Option<TaskFailure>,
    /// Tasks still pending afterwards.
    pub pending: usize,
}

pub struct TransferSession<C> {
    channel: C,
    config: SessionConfig,
    tasks: Vec<FileTransferTask>,
    estimator: ThroughputEstimator,
    logger: Arc<dyn TransferLogger>,
    updates: broadcast::Sender<TaskSnapshot>,
    status: SessionStatus,
}

impl<C: DataChannel> TransferSession<C> {
    pub fn new(channel: C) -> Self {
        Self::with_config(channel, SessionConfig::default())
    }

    /// Zero `window` or `chunk_size` is raised to one.
    pub fn with_config(channel: C, mut config: SessionConfig) -> Self {
        config.window = config.window.max(1);
        config.chunk_size = config.chunk_size.max(1);
        let (updates, _) = broadcast::channel(UPDATE_CAPACITY);
        Self {
            channel,
            config,
            tasks: Vec::new(),
            estimator: ThroughputEstimator::new(),
            logger: Arc::new(TracingLogger),
            updates,
            status: SessionStatus::Idle,
        }
    }

    pub fn with_logger(mut self, logger: Arc<dyn TransferLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Append a pending task for `file` and return its id.
    pub fn enqueue(&mut self, file: SourceFile) -> String {
        let task = FileTransferTask::new(file, self.config.chunk_size);
        let id = task.id().to_string();
        self.tasks.push(task);
        id
    }

    /// Receive every snapshot published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskSnapshot> {
        self.updates.subscribe()
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn task(&self, id: &str) -> Option<TaskSnapshot> {
        self.tasks.iter().find(|t| t.id == id).map(FileTransferTask::snapshot)
    }

    pub fn tasks(&self) -> Vec<TaskSnapshot> {
        self.tasks.iter().map(FileTransferTask::snapshot).collect()
    }

    /// Send pending tasks in queue order, stopping at the first failure.
    pub async fn run(&mut self) -> RunSummary {
        let mut summary = RunSummary::default();

        for idx in 0..self.tasks.len() {
            if self.tasks[idx].status.is_terminal() {
                continue;
            }
            match self.transfer_task(idx).await {
                Ok(()) => summary.completed += 1,
                Err(error) => {
                    summary.failed = Some(TaskFailure {
                        task_id: self.tasks[idx].id.clone(),
                        error,
                    });
                    break;
                }
            }
        }

        summary.pending = self
            .tasks
            .iter()
            .filter(|t| t.status == TransferStatus::Pending)
            .count();
        summary
    }

    async fn transfer_task(&mut self, idx: usize) -> Result<(), TransferError> {
        let started = Instant::now();
        let task = &mut self.tasks[idx];
        task.status = TransferStatus::Transferring;
        let id = task.id.clone();
        let file = task.file.clone();
        let total = task.total_chunks;
        let chunk_size = task.chunk_size;

        self.status = SessionStatus::Sending;
        self.log(&id, TransferEvent::TaskStarted {
            file_name: file.name.clone(),
            size: file.size(),
            total_chunks: total,
        });
        self.publish(idx);
        self.estimator.sample(&id, 0);

        let window = self.config.window as u32;
        let mut sent_bytes = 0u64;
        let mut first = 0u32;

        while first < total {
            let last = (first + window).min(total);
            let sends = (first..last).map(|index| {
                let chunk = codec::chunk_at(&file.data, chunk_size, index);
                let message = ChunkMessage {
                    file_id: id.clone(),
                    file_name: file.name.clone(),
                    file_type: file.mime_type.clone(),
                    chunk: chunk.data,
                    chunk_index: index,
                    total_chunks: total,
                };
                send_with_retry(&self.channel, message, &self.config, self.logger.as_ref())
            });

            let dispatched = try_join_all(sends).await;
            match dispatched {
                Ok(lens) => sent_bytes += lens.iter().sum::<u64>(),
                Err(error) => {
                    self.finish(idx, TransferStatus::Failed);
                    self.log(&id, TransferEvent::Error {
                        message: error.to_string(),
                    });
                    return Err(error);
                }
            }

            let progress = ((last as f64 / total as f64) * 100.0).round().min(100.0) as u8;
            let speed = self.estimator.sample(&id, sent_bytes);
            let task = &mut self.tasks[idx];
            task.progress = progress;
            if let Some(speed) = speed {
                task.speed = speed;
            }
            self.log(&id, TransferEvent::WindowDispatched {
                first_chunk: first,
                last_chunk: last - 1,
                progress,
            });
            self.publish(idx);

            first = last;
        }

        self.tasks[idx].progress = 100;
        self.finish(idx, TransferStatus::Completed);
        self.log(&id, TransferEvent::TransferComplete {
            total_bytes: sent_bytes,
            duration_ms: started.elapsed().as_millis() as u64,
        });
        Ok(())
    }

    fn finish(&mut self, idx: usize, status: TransferStatus) {
        let task = &mut self.tasks[idx];
        task.status = status;
        self.estimator.dispose(&task.id);
        self.status = match status {
            TransferStatus::Completed => SessionStatus::Sent,
            _ => SessionStatus::Failed,
        };
        self.publish(idx);
    }

    fn publish(&self, idx: usize) {
        // No subscribers is fine.
        let _ = self.updates.send(self.tasks[idx].snapshot());
    }

    fn log(&self, file_id: &str, event: TransferEvent) {
        self.logger.log(TransferLog {
            component: "sender",
            file_id: file_id.to_string(),
            event,
        });
    }
}

/// Send one chunk, retrying transient failures. Returns the payload length.
async fn send_with_retry<C: DataChannel>(
    channel: &C,
    chunk: ChunkMessage,
    config: &SessionConfig,
    logger: &dyn TransferLogger,
) -> Result<u64, TransferError> {
    let len = chunk.len() as u64;
    let chunk_index = chunk.chunk_index;
    let file_id = chunk.file_id.clone();
    let message = ChannelMessage::from(chunk);
    let attempts = config.max_retries + 1;

    for attempt in 1..=attempts {
        match channel.send(message.clone()).await {
            Ok(()) => return Ok(len),
            Err(ChannelError::Closed) => {
                return Err(TransferError::ChannelClosed { file_id });
            }
            Err(e) if attempt < attempts => {
                logger.log(TransferLog {
                    component: "sender",
                    file_id: file_id.clone(),
                    event: TransferEvent::ChunkRetry {
                        chunk_index,
                        attempt,
                        error: e.to_string(),
                    },
                });
                tokio::time::sleep(config.retry_delay).await;
            }
            Err(_) => {}
        }
    }

    logger.log(TransferLog {
        component: "sender",
        file_id: file_id.clone(),
        event: TransferEvent::ChunkFailed { chunk_index, attempts },
    });
    Err(TransferError::PermanentSendFailure {
        file_id,
        chunk_index,
        attempts,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;
    use crate::logging::NullLogger;

    /// Records every attempt; chunks listed in `failing` always fail.
    #[derive(Default)]
    struct RecordingChannel {
        attempts: Mutex<HashMap<u32, u32>>,
        delivered: Mutex<Vec<u32>>,
        failing: Vec<u32>,
        closed: bool,
    }

    impl RecordingChannel {
        fn failing(indices: &[u32]) -> Self {
            Self {
                failing: indices.to_vec(),
                ..Default::default()
            }
        }

        fn attempts_on(&self, index: u32) -> u32 {
            self.attempts.lock().unwrap().get(&index).copied().unwrap_or(0)
        }

        fn max_attempted(&self) -> Option<u32> {
            self.attempts.lock().unwrap().keys().copied().max()
        }
    }

    impl DataChannel for RecordingChannel {
        async fn send(&self, message: ChannelMessage) -> Result<(), ChannelError> {
            let ChannelMessage::Chunk(chunk) = message;
            *self.attempts.lock().unwrap().entry(chunk.chunk_index).or_default() += 1;
            if self.closed {
                return Err(ChannelError::Closed);
            }
            if self.failing.contains(&chunk.chunk_index) {
                return Err(ChannelError::Send("boom".into()));
            }
            self.delivered.lock().unwrap().push(chunk.chunk_index);
            Ok(())
        }

        async fn close(&self) {}
    }

    fn session(channel: RecordingChannel) -> TransferSession<RecordingChannel> {
        let config = SessionConfig {
            chunk_size: 4,
            ..SessionConfig::default()
        };
        TransferSession::with_config(channel, config).with_logger(Arc::new(NullLogger))
    }

    fn file(len: usize) -> SourceFile {
        SourceFile::new("data.bin", "application/octet-stream", vec![7u8; len])
    }

    #[tokio::test(start_paused = true)]
    async fn failing_chunk_exhausts_retries_and_stops_the_task() {
        let mut session = session(RecordingChannel::failing(&[4]));
        let id = session.enqueue(file(40));
        let mut updates = session.subscribe();

        let summary = session.run().await;

        let failure = summary.failed.expect("task should fail");
        assert_eq!(failure.task_id, id);
        assert!(matches!(
            failure.error,
            TransferError::PermanentSendFailure { chunk_index: 4, attempts: 4, .. }
        ));
        assert_eq!(session.channel().attempts_on(4), 4);
        assert_eq!(session.channel().max_attempted(), Some(5));
        assert_eq!(session.task(&id).unwrap().status, TransferStatus::Failed);
        assert_eq!(session.status(), SessionStatus::Failed);

        while let Ok(snap) = updates.try_recv() {
            assert_ne!(snap.status, TransferStatus::Completed);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_wait_between_attempts() {
        let mut session = session(RecordingChannel::failing(&[0]));
        session.enqueue(file(4));

        let start = Instant::now();
        session.run().await;
        let elapsed = start.elapsed();
        assert!(elapsed >= DEFAULT_RETRY_DELAY * 3, "elapsed {elapsed:?}");
        assert!(elapsed < DEFAULT_RETRY_DELAY * 4, "elapsed {elapsed:?}");
        assert_eq!(session.channel().attempts_on(0), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn progress_follows_dispatched_chunks() {
        let mut session = session(RecordingChannel::default());
        let id = session.enqueue(file(40));
        let mut updates = session.subscribe();

        let summary = session.run().await;
        assert_eq!(summary.completed, 1);
        assert!(summary.failed.is_none());

        let mut progress = Vec::new();
        while let Ok(snap) = updates.try_recv() {
            assert_eq!(snap.id, id);
            progress.push((snap.status, snap.progress));
        }
        assert_eq!(
            progress,
            vec![
                (TransferStatus::Transferring, 0),
                (TransferStatus::Transferring, 30),
                (TransferStatus::Transferring, 60),
                (TransferStatus::Transferring, 90),
                (TransferStatus::Transferring, 100),
                (TransferStatus::Completed, 100),
            ]
        );
        assert_eq!(session.channel().delivered.lock().unwrap().len(), 10);
        assert_eq!(session.status(), SessionStatus::Sent);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_leaves_later_files_pending() {
        let mut session = session(RecordingChannel::failing(&[1]));
        let first = session.enqueue(file(8));
        let second = session.enqueue(file(8));

        let summary = session.run().await;
        assert_eq!(summary.completed, 0);
        assert_eq!(summary.pending, 1);
        assert_eq!(session.task(&first).unwrap().status, TransferStatus::Failed);
        assert_eq!(session.task(&second).unwrap().status, TransferStatus::Pending);

        // A second run skips the failed task and tries the next one.
        let summary = session.run().await;
        assert!(summary.failed.is_some());
        assert_eq!(session.task(&first).unwrap().status, TransferStatus::Failed);
        assert_eq!(session.task(&second).unwrap().status, TransferStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_channel_is_not_retried() {
        let channel = RecordingChannel {
            closed: true,
            ..Default::default()
        };
        let mut session = session(channel);
        session.enqueue(file(4));

        let summary = session.run().await;
        assert!(matches!(
            summary.failed.map(|f| f.error),
            Some(TransferError::ChannelClosed { .. })
        ));
        assert_eq!(session.channel().attempts_on(0), 1);
    }

    #[tokio::test]
    async fn zero_sizes_in_config_are_clamped() {
        let config = SessionConfig {
            window: 0,
            chunk_size: 0,
            ..SessionConfig::default()
        };
        let channel = RecordingChannel::failing(&[]);
        let mut session =
            TransferSession::with_config(channel, config).with_logger(Arc::new(NullLogger));
        assert_eq!(session.config().window, 1);
        assert_eq!(session.config().chunk_size, 1);

        let id = session.enqueue(file(3));
        let summary = session.run().await;

        assert_eq!(summary.completed, 1);
        assert_eq!(session.task(&id).unwrap().status, TransferStatus::Completed);
        assert_eq!(*session.channel().delivered.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn empty_file_completes_without_sending() {
        let mut session = session(RecordingChannel::default());
        let id = session.enqueue(file(0));

        let summary = session.run().await;
        assert_eq!(summary.completed, 1);
        let snap = session.task(&id).unwrap();
        assert_eq!(snap.total_chunks, 0);
        assert_eq!(snap.status, TransferStatus::Completed);
        assert_eq!(snap.progress, 100);
        assert_eq!(session.channel().max_attempted(), None);
    }
}
