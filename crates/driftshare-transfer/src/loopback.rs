//! In-process transport for tests and local demos.
//!
//! Every message is encoded to JSON text and decoded on the far side, the
//! same round trip a string-carrying data channel performs. A send fault
//! hook lets tests fail chosen chunks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use driftshare_types::wire::{self, ChunkMessage};
use driftshare_types::ChannelMessage;
use tokio::sync::mpsc;

use crate::channel::{ChannelEvent, Connection, DataChannel, Endpoint};
use crate::error::ChannelError;

/// Events buffered per direction before `send` waits for the reader.
const EVENT_QUEUE_DEPTH: usize = 64;

type SendFault = Box<dyn FnMut(&ChunkMessage) -> bool + Send>;

#[derive(Default)]
struct NetworkInner {
    endpoints: Mutex<HashMap<String, mpsc::UnboundedSender<Connection<LoopbackChannel>>>>,
    fault: Arc<Mutex<Option<SendFault>>>,
}

/// A set of endpoints that can reach each other by id.
#[derive(Clone, Default)]
pub struct LoopbackNetwork {
    inner: Arc<NetworkInner>,
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an endpoint under `id`, replacing any previous one.
    pub fn endpoint(&self, id: impl Into<String>) -> LoopbackEndpoint {
        let id = id.into();
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut endpoints) = self.inner.endpoints.lock() {
            endpoints.insert(id.clone(), tx);
        }
        LoopbackEndpoint {
            id,
            network: self.clone(),
            incoming: tokio::sync::Mutex::new(rx),
        }
    }

    /// Fail every chunk send for which `fault` returns true.
    pub fn inject_send_fault(&self, fault: impl FnMut(&ChunkMessage) -> bool + Send + 'static) {
        if let Ok(mut slot) = self.inner.fault.lock() {
            *slot = Some(Box::new(fault));
        }
    }

    pub fn clear_send_fault(&self) {
        if let Ok(mut slot) = self.inner.fault.lock() {
            *slot = None;
        }
    }
}

pub struct LoopbackEndpoint {
    id: String,
    network: LoopbackNetwork,
    incoming: tokio::sync::Mutex<mpsc::UnboundedReceiver<Connection<LoopbackChannel>>>,
}

impl Endpoint for LoopbackEndpoint {
    type Channel = LoopbackChannel;

    fn local_id(&self) -> &str {
        &self.id
    }

    async fn connect(&self, remote_id: &str) -> Result<Connection<LoopbackChannel>, ChannelError> {
        let acceptor = self
            .network
            .inner
            .endpoints
            .lock()
            .map_err(|_| ChannelError::Connect("network lock poisoned".into()))?
            .get(remote_id)
            .cloned()
            .ok_or_else(|| ChannelError::Connect(format!("unknown peer {remote_id}")))?;

        let (to_local, local_events) = mpsc::channel(EVENT_QUEUE_DEPTH);
        let (to_remote, remote_events) = mpsc::channel(EVENT_QUEUE_DEPTH);
        let closed = Arc::new(AtomicBool::new(false));
        let fault = self.network.inner.fault.clone();

        // Both sides see Open before anything else.
        to_local
            .try_send(ChannelEvent::Open)
            .map_err(|e| ChannelError::Connect(e.to_string()))?;
        to_remote
            .try_send(ChannelEvent::Open)
            .map_err(|e| ChannelError::Connect(e.to_string()))?;

        let local_channel = LoopbackChannel {
            peer: to_remote.clone(),
            own: to_local.clone(),
            closed: closed.clone(),
            fault: fault.clone(),
        };
        let remote_channel = LoopbackChannel {
            peer: to_local,
            own: to_remote,
            closed,
            fault,
        };

        acceptor
            .send(Connection {
                remote_id: self.id.clone(),
                channel: remote_channel,
                events: remote_events,
            })
            .map_err(|_| ChannelError::Connect(format!("peer {remote_id} is gone")))?;

        tracing::debug!(local = %self.id, remote = %remote_id, "loopback connection opened");

        Ok(Connection {
            remote_id: remote_id.to_string(),
            channel: local_channel,
            events: local_events,
        })
    }

    async fn accept(&self) -> Result<Connection<LoopbackChannel>, ChannelError> {
        self.incoming.lock().await.recv().await.ok_or(ChannelError::Closed)
    }
}

/// One side of a loopback connection.
pub struct LoopbackChannel {
    peer: mpsc::Sender<ChannelEvent>,
    own: mpsc::Sender<ChannelEvent>,
    closed: Arc<AtomicBool>,
    fault: Arc<Mutex<Option<SendFault>>>,
}

impl LoopbackChannel {
    fn faulted(&self, message: &ChannelMessage) -> bool {
        let ChannelMessage::Chunk(chunk) = message;
        match self.fault.lock() {
            Ok(mut slot) => slot.as_mut().is_some_and(|f| f(chunk)),
            Err(_) => false,
        }
    }
}

impl DataChannel for LoopbackChannel {
    async fn send(&self, message: ChannelMessage) -> Result<(), ChannelError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ChannelError::Closed);
        }
        if self.faulted(&message) {
            return Err(ChannelError::Send("injected fault".into()));
        }

        let text = wire::encode(&message).map_err(|e| ChannelError::Send(e.to_string()))?;
        let decoded = wire::decode(&text).map_err(|e| ChannelError::Send(e.to_string()))?;
        self.peer
            .send(ChannelEvent::Message(decoded))
            .await
            .map_err(|_| ChannelError::Closed)
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        // Queued behind any in-flight messages on the peer side.
        let _ = self.peer.send(ChannelEvent::Closed).await;
        let _ = self.own.try_send(ChannelEvent::Closed);
    }
}
