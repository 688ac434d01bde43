//! Shared types for driftshare: the peer wire message and the share
//! registry's HTTP request/response bodies.

pub mod api;
pub mod wire;

pub use wire::{ChannelMessage, ChunkMessage};
