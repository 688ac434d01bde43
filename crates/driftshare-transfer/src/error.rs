//! Error types for the transfer protocol.

/// Failure reported by a [`DataChannel`](crate::channel::DataChannel) or
/// [`Endpoint`](crate::channel::Endpoint).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// The channel was closed by either side. Never retried.
    #[error("channel closed")]
    Closed,

    /// A single send attempt failed. May succeed if retried.
    #[error("send failed: {0}")]
    Send(String),

    #[error("connect failed: {0}")]
    Connect(String),
}

/// Terminal failure of a file-send task.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    #[error("chunk {chunk_index} of {file_id} failed after {attempts} attempts")]
    PermanentSendFailure {
        file_id: String,
        chunk_index: u32,
        attempts: u32,
    },

    #[error("channel closed while sending {file_id}")]
    ChannelClosed { file_id: String },
}

/// An inbound chunk that cannot be applied. The message is dropped and
/// every reception in progress is left as it was.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReassemblyError {
    #[error("chunk index {index} out of range for {total} chunks")]
    IndexOutOfRange { index: u32, total: u32 },

    #[error("total chunk count changed from {expected} to {got}")]
    TotalMismatch { expected: u32, got: u32 },

    #[error("chunk announces zero total chunks")]
    EmptyTransfer,

    #[error("{total} chunks exceeds the limit of {max}")]
    TooManyChunks { total: u32, max: u32 },

    #[error("chunk of {len} bytes exceeds the limit of {max}")]
    ChunkTooLarge { len: usize, max: usize },

    #[error("file already finished")]
    AlreadyFinished,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("chunk {0} missing")]
    MissingChunk(u32),
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("invalid file name: {0}")]
    InvalidName(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
