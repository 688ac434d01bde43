//! Receive loop: channel events in, finished files out.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use driftshare_types::ChannelMessage;
use tokio::sync::{mpsc, watch};

use crate::channel::ChannelEvent;
use crate::error::DeliveryError;
use crate::reassembly::{ReassemblyBuffer, ReceivedFile, ReceptionOutcome};

/// Where completed files end up.
#[allow(async_fn_in_trait)]
pub trait Delivery {
    async fn deliver(&mut self, file: ReceivedFile) -> Result<(), DeliveryError>;
}

/// Writes each file into a directory, keeping only the final path
/// component of the announced name.
#[derive(Debug)]
pub struct DirectoryDelivery {
    dir: PathBuf,
    saved: Vec<PathBuf>,
}

impl DirectoryDelivery {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            saved: Vec::new(),
        }
    }

    /// Paths written so far, in delivery order.
    pub fn saved(&self) -> &[PathBuf] {
        &self.saved
    }
}

fn sanitize_file_name(name: &str) -> Result<&str, DeliveryError> {
    // Peers may send either separator.
    let last = name.rsplit(['/', '\\']).next().unwrap_or_default();
    match Path::new(last).components().next() {
        Some(Component::Normal(_)) if !last.is_empty() => Ok(last),
        _ => Err(DeliveryError::InvalidName(name.to_string())),
    }
}

impl Delivery for DirectoryDelivery {
    async fn deliver(&mut self, file: ReceivedFile) -> Result<(), DeliveryError> {
        let name = sanitize_file_name(&file.file_name)?;
        let path = self.dir.join(name);
        tokio::fs::write(&path, &file.data).await?;
        tracing::info!(path = %path.display(), bytes = file.data.len(), "file saved");
        self.saved.push(path);
        Ok(())
    }
}

/// Keeps delivered files in memory.
#[derive(Debug, Default)]
pub struct CollectDelivery {
    files: Vec<ReceivedFile>,
}

impl CollectDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn files(&self) -> &[ReceivedFile] {
        &self.files
    }

    pub fn into_files(self) -> Vec<ReceivedFile> {
        self.files
    }
}

impl Delivery for CollectDelivery {
    async fn deliver(&mut self, file: ReceivedFile) -> Result<(), DeliveryError> {
        self.files.push(file);
        Ok(())
    }
}

/// What the receiving side shows the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverStatus {
    Waiting,
    Connected,
    Receiving,
    FileReceived,
    TransferFailed,
    ConnectionClosed,
}

impl ReceiverStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "Peer started. Waiting for connection...",
            Self::Connected => "Connected",
            Self::Receiving => "Receiving file...",
            Self::FileReceived => "File received",
            Self::TransferFailed => "Transfer failed",
            Self::ConnectionClosed => "Connection closed",
        }
    }
}

impl fmt::Display for ReceiverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Totals for one receive loop.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReceiveSummary {
    pub files_received: usize,
    pub integrity_failures: usize,
    pub rejected_chunks: usize,
}

/// Process channel events one at a time until the channel closes.
///
/// A closed channel, or an event stream that ends, discards any partial
/// reception. Delivery errors stop the loop.
pub async fn run_receiver<D: Delivery>(
    mut events: mpsc::Receiver<ChannelEvent>,
    buffer: &mut ReassemblyBuffer,
    delivery: &mut D,
    status: &watch::Sender<ReceiverStatus>,
) -> Result<ReceiveSummary, DeliveryError> {
    let mut summary = ReceiveSummary::default();

    while let Some(event) = events.recv().await {
        match event {
            ChannelEvent::Open => {
                status.send_replace(ReceiverStatus::Connected);
            }
            ChannelEvent::Message(ChannelMessage::Chunk(chunk)) => {
                match buffer.on_chunk(chunk) {
                    Ok(ReceptionOutcome::Progress { .. }) => {
                        status.send_replace(ReceiverStatus::Receiving);
                    }
                    Ok(ReceptionOutcome::Completed(file)) => {
                        delivery.deliver(file).await?;
                        summary.files_received += 1;
                        status.send_replace(ReceiverStatus::FileReceived);
                    }
                    Ok(ReceptionOutcome::Failed { .. }) => {
                        summary.integrity_failures += 1;
                        status.send_replace(ReceiverStatus::TransferFailed);
                    }
                    // Already logged by the buffer
                    Err(_) => summary.rejected_chunks += 1,
                }
            }
            ChannelEvent::Closed => break,
        }
    }

    buffer.abort();
    status.send_replace(ReceiverStatus::ConnectionClosed);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use driftshare_types::ChunkMessage;

    use super::*;
    use crate::logging::NullLogger;
    use std::sync::Arc;

    fn chunk(file_id: &str, name: &str, index: u32, total: u32, data: &'static [u8]) -> ChannelEvent {
        ChannelEvent::Message(
            ChunkMessage {
                file_id: file_id.into(),
                file_name: name.into(),
                file_type: "text/plain".into(),
                chunk: Bytes::from_static(data),
                chunk_index: index,
                total_chunks: total,
            }
            .into(),
        )
    }

    #[test]
    fn file_names_are_reduced_to_final_component() {
        assert_eq!(sanitize_file_name("notes.txt").unwrap(), "notes.txt");
        assert_eq!(sanitize_file_name("../../etc/passwd").unwrap(), "passwd");
        assert_eq!(sanitize_file_name("C:\\Users\\x\\a.png").unwrap(), "a.png");
        assert!(sanitize_file_name("").is_err());
        assert!(sanitize_file_name("..").is_err());
        assert!(sanitize_file_name("dir/").is_err());
    }

    #[tokio::test]
    async fn loop_delivers_files_and_reports_status() {
        let (tx, rx) = mpsc::channel(16);
        let (status_tx, status_rx) = watch::channel(ReceiverStatus::Waiting);
        let mut buffer = ReassemblyBuffer::new().with_logger(Arc::new(NullLogger));
        let mut sink = CollectDelivery::new();

        tx.send(ChannelEvent::Open).await.unwrap();
        tx.send(chunk("a", "a.txt", 1, 2, b"lo")).await.unwrap();
        tx.send(chunk("b", "b.txt", 0, 2, b"partial")).await.unwrap();
        tx.send(chunk("a", "a.txt", 9, 2, b"??")).await.unwrap();
        tx.send(chunk("a", "a.txt", 0, 2, b"hel")).await.unwrap();
        tx.send(ChannelEvent::Closed).await.unwrap();

        let summary = run_receiver(rx, &mut buffer, &mut sink, &status_tx).await.unwrap();

        assert_eq!(
            summary,
            ReceiveSummary {
                files_received: 1,
                integrity_failures: 0,
                rejected_chunks: 1,
            }
        );
        assert_eq!(sink.files().len(), 1);
        assert_eq!(sink.files()[0].data.as_ref(), b"hello");
        assert_eq!(buffer.active_count(), 0);
        assert_eq!(*status_rx.borrow(), ReceiverStatus::ConnectionClosed);
        assert_eq!(status_rx.borrow().as_str(), "Connection closed");
    }

    #[tokio::test]
    async fn dropped_sender_ends_the_loop() {
        let (tx, rx) = mpsc::channel(4);
        let (status_tx, _status_rx) = watch::channel(ReceiverStatus::Waiting);
        let mut buffer = ReassemblyBuffer::new().with_logger(Arc::new(NullLogger));
        let mut sink = CollectDelivery::new();

        tx.send(chunk("a", "a.txt", 0, 3, b"x")).await.unwrap();
        drop(tx);

        let summary = run_receiver(rx, &mut buffer, &mut sink, &status_tx).await.unwrap();
        assert_eq!(summary.files_received, 0);
        assert!(sink.into_files().is_empty());
        assert_eq!(buffer.active_count(), 0);
    }

    #[tokio::test]
    async fn directory_delivery_writes_into_target_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = DirectoryDelivery::new(dir.path());

        sink.deliver(ReceivedFile {
            file_id: "f".into(),
            file_name: "../escape.txt".into(),
            file_type: "text/plain".into(),
            data: Bytes::from_static(b"contents"),
        })
        .await
        .unwrap();

        let expected = dir.path().join("escape.txt");
        assert_eq!(sink.saved(), &[expected.clone()]);
        assert_eq!(tokio::fs::read(&expected).await.unwrap(), b"contents");

        let err = sink
            .deliver(ReceivedFile {
                file_id: "g".into(),
                file_name: "..".into(),
                file_type: String::new(),
                data: Bytes::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::InvalidName(_)));
    }
}
