//! File-send tasks and their observable state.

use std::fmt;
use std::path::Path;

use bytes::Bytes;

use crate::codec;
use crate::protocol::DEFAULT_MIME_TYPE;

/// A file ready to be enqueued: name, MIME type and its bytes.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub mime_type: String,
    pub data: Bytes,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    /// Read a file from disk. The MIME type is left at the generic default.
    pub async fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        Ok(Self::new(name, DEFAULT_MIME_TYPE, data))
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Pending,
    Transferring,
    Completed,
    Failed,
}

impl TransferStatus {
    /// Completed and Failed never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Transferring => "transferring",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One queued file. Mutated only by the session while it runs this task.
#[derive(Debug)]
pub struct FileTransferTask {
    pub(crate) id: String,
    pub(crate) file: SourceFile,
    pub(crate) chunk_size: usize,
    pub(crate) total_chunks: u32,
    pub(crate) status: TransferStatus,
    pub(crate) progress: u8,
    pub(crate) speed: f64,
}

impl FileTransferTask {
    pub(crate) fn new(file: SourceFile, chunk_size: usize) -> Self {
        let total_chunks = codec::chunk_count(file.size(), chunk_size);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            file,
            chunk_size,
            total_chunks,
            status: TransferStatus::Pending,
            progress: 0,
            speed: 0.0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            id: self.id.clone(),
            file_name: self.file.name.clone(),
            mime_type: self.file.mime_type.clone(),
            size: self.file.size(),
            chunk_size: self.chunk_size,
            total_chunks: self.total_chunks,
            status: self.status,
            progress: self.progress,
            speed: self.speed,
        }
    }
}

/// Point-in-time copy of a task, handed to observers.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSnapshot {
    pub id: String,
    pub file_name: String,
    pub mime_type: String,
    pub size: u64,
    pub chunk_size: usize,
    pub total_chunks: u32,
    pub status: TransferStatus,
    /// 0..=100
    pub progress: u8,
    /// Bytes per second.
    pub speed: f64,
}
