/// Driftshare Transfer: chunked file transfer over peer data channels.
///
/// Provides:
/// - Fixed-size chunking and index-addressed reassembly
/// - Windowed concurrent dispatch with bounded per-chunk retry
/// - Smoothed throughput estimation for progress display
/// - A receive loop that hands finished files to a delivery sink
/// - An in-process loopback transport for tests

pub mod channel;
pub mod codec;
pub mod error;
pub mod logging;
pub mod loopback;
pub mod protocol;
pub mod reassembly;
pub mod receiver;
pub mod session;
pub mod task;
pub mod throughput;

// Re-export key types for convenience.
pub use channel::{ChannelEvent, Connection, DataChannel, Endpoint};
pub use error::{ChannelError, CodecError, DeliveryError, ReassemblyError, TransferError};
pub use logging::{NullLogger, TracingLogger, TransferEvent, TransferLog, TransferLogger};
pub use loopback::{LoopbackChannel, LoopbackEndpoint, LoopbackNetwork};
pub use protocol::{
    CHUNK_SIZE, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY, DEFAULT_WINDOW, MAX_TOTAL_CHUNKS,
};
pub use reassembly::{ReassemblyBuffer, ReassemblyLimits, ReceivedFile, ReceptionOutcome};
pub use receiver::{
    CollectDelivery, Delivery, DirectoryDelivery, ReceiveSummary, ReceiverStatus, run_receiver,
};
pub use session::{RunSummary, SessionConfig, SessionStatus, TaskFailure, TransferSession};
pub use task::{SourceFile, TaskSnapshot, TransferStatus};
pub use throughput::{ThroughputEstimator, format_rate};
