//! Contract with the transport that opens peer data channels.
//!
//! Signaling and connection negotiation are outside this crate. A transport
//! hands over an established [`Connection`]: a channel to send on and a
//! stream of [`ChannelEvent`]s coming from the peer.

use driftshare_types::ChannelMessage;
use tokio::sync::mpsc;

use crate::error::ChannelError;

/// Message-oriented, unordered channel to one peer.
#[allow(async_fn_in_trait)]
pub trait DataChannel {
    /// Hand one message to the transport. Resolves when it was accepted.
    async fn send(&self, message: ChannelMessage) -> Result<(), ChannelError>;

    /// Close both directions. The peer observes [`ChannelEvent::Closed`].
    async fn close(&self);
}

/// Something the peer did, delivered in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Open,
    Message(ChannelMessage),
    Closed,
}

/// An established connection.
pub struct Connection<C> {
    pub remote_id: String,
    pub channel: C,
    pub events: mpsc::Receiver<ChannelEvent>,
}

/// A local peer that can dial or accept connections by peer id.
#[allow(async_fn_in_trait)]
pub trait Endpoint {
    type Channel: DataChannel;

    /// Id other peers use to reach this endpoint. This is what gets
    /// registered as a share.
    fn local_id(&self) -> &str;

    async fn connect(&self, remote_id: &str) -> Result<Connection<Self::Channel>, ChannelError>;

    /// Wait for the next inbound connection.
    async fn accept(&self) -> Result<Connection<Self::Channel>, ChannelError>;
}
