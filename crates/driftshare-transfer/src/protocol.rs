/// Chunked transfer protocol constants.
///
/// ```text
/// file (N bytes) ──split──> [chunk 0][chunk 1] ... [chunk k-1]
///                           262144 B each, last holds the remainder
///                           k = ceil(N / 262144)
/// ```
use std::time::Duration;

/// Payload bytes per chunk (256 KiB). The final chunk of a file may be shorter.
pub const CHUNK_SIZE: usize = 262_144;

/// Chunks issued together before progress is re-evaluated.
pub const DEFAULT_WINDOW: usize = 3;

/// Extra attempts per chunk after the first send fails.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Fixed pause between attempts for one chunk.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Largest announced chunk count a receiver will allocate slots for
/// (16 GiB at the default chunk size).
pub const MAX_TOTAL_CHUNKS: u32 = 65_536;

/// Files a receiver assembles side by side. Beyond this the reception
/// idle the longest is dropped.
pub const MAX_CONCURRENT_RECEPTIONS: usize = 4;

/// Finished file keys remembered so late duplicates are dropped.
pub const FINISHED_HISTORY_LEN: usize = 32;

/// Minimum spacing between accepted throughput samples for one id.
pub const SPEED_SAMPLE_INTERVAL: Duration = Duration::from_millis(500);

/// Instantaneous rates averaged into the reported speed.
pub const SPEED_HISTORY_LEN: usize = 5;

/// Rates at or above this (bytes/sec) are treated as sensor noise.
pub const MAX_PLAUSIBLE_RATE: f64 = 1e9;

/// MIME type used when the source does not supply one.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";
