//! Ephemeral share registry: short-lived tokens that point at a peer's
//! endpoint id, used once to bootstrap a connection.

pub mod cleanup;
pub mod error;
pub mod registry;
pub mod store;
pub mod token;

pub use cleanup::{MAX_SWEEP_INTERVAL, run_sweep_loop, sweep_interval};
pub use error::RegistryError;
pub use registry::{SHARE_TTL, ShareRegistry};
pub use store::{MemoryStore, ShareEntry, ShareStore, SqliteStore};
