//! In-process transport
//!
//! [`MemoryTransport::new`] returns the transport plus a [`MemoryPeer`] that
//! plays the platform side. Every [`MemoryPeer::attach`] queues one link;
//! serving channels accept it, dialing channels pick it up on their next try.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};

use crate::error::ChannelError;
use crate::transport::{Link, Transport};

/// Frames buffered per direction
const LINK_CAPACITY: usize = 64;

struct Shared {
    pending: Mutex<mpsc::UnboundedReceiver<MemoryLink>>,
    refuse_bind: AtomicBool,
    refuse_connect: AtomicBool,
    connect_attempts: AtomicUsize,
}

/// Transport whose peer lives in the same process
pub struct MemoryTransport {
    shared: Arc<Shared>,
}

/// Platform side of a [`MemoryTransport`]
#[derive(Clone)]
pub struct MemoryPeer {
    attach_tx: mpsc::UnboundedSender<MemoryLink>,
}

/// Endpoint created by a serving channel
pub struct MemoryListener {
    name: String,
}

impl MemoryListener {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl MemoryTransport {
    pub fn new() -> (Self, MemoryPeer) {
        let (attach_tx, attach_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            pending: Mutex::new(attach_rx),
            refuse_bind: AtomicBool::new(false),
            refuse_connect: AtomicBool::new(false),
            connect_attempts: AtomicUsize::new(0),
        });
        (Self { shared }, MemoryPeer { attach_tx })
    }

    /// Make endpoint creation fail
    pub fn refuse_bind(&self, refuse: bool) {
        self.shared.refuse_bind.store(refuse, Ordering::SeqCst);
    }

    /// Make every accept and dial fail immediately
    pub fn refuse_connect(&self, refuse: bool) {
        self.shared.refuse_connect.store(refuse, Ordering::SeqCst);
    }

    /// Accept and dial calls made so far
    pub fn connect_attempts(&self) -> usize {
        self.shared.connect_attempts.load(Ordering::SeqCst)
    }

    /// Handle for adjusting faults after the transport moved into a channel
    pub fn handle(&self) -> MemoryTransport {
        MemoryTransport {
            shared: Arc::clone(&self.shared),
        }
    }

    fn refused(&self, name: &str) -> Option<ChannelError> {
        self.shared.connect_attempts.fetch_add(1, Ordering::SeqCst);
        self.shared
            .refuse_connect
            .load(Ordering::SeqCst)
            .then(|| ChannelError::Connect {
                name: name.to_string(),
                reason: "connection refused".to_string(),
            })
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    type Listener = MemoryListener;
    type Link = MemoryLink;

    async fn bind(&self, name: &str) -> Result<MemoryListener, ChannelError> {
        if self.shared.refuse_bind.load(Ordering::SeqCst) {
            return Err(ChannelError::Create {
                name: name.to_string(),
                reason: "endpoint creation refused".to_string(),
            });
        }
        Ok(MemoryListener {
            name: name.to_string(),
        })
    }

    async fn accept(&self, listener: &mut MemoryListener) -> Result<MemoryLink, ChannelError> {
        if let Some(err) = self.refused(&listener.name) {
            return Err(err);
        }
        let mut pending = self.shared.pending.lock().await;
        pending.recv().await.ok_or_else(|| ChannelError::Connect {
            name: listener.name.clone(),
            reason: "peer dropped".to_string(),
        })
    }

    async fn dial(&self, name: &str) -> Result<MemoryLink, ChannelError> {
        if let Some(err) = self.refused(name) {
            return Err(err);
        }
        let mut pending = self.shared.pending.lock().await;
        pending.try_recv().map_err(|_| ChannelError::Connect {
            name: name.to_string(),
            reason: "endpoint not found".to_string(),
        })
    }
}

impl MemoryPeer {
    /// Queue a new link and return the platform's end of it
    pub async fn attach(&self) -> Result<PeerLink, ChannelError> {
        let (to_local, from_peer) = mpsc::channel(LINK_CAPACITY);
        let (to_peer, from_local) = mpsc::channel(LINK_CAPACITY);
        self.attach_tx
            .send(MemoryLink {
                rx: from_peer,
                tx: to_peer,
            })
            .map_err(|_| ChannelError::Closed)?;
        Ok(PeerLink {
            tx: to_local,
            rx: from_local,
        })
    }
}

/// Local end of an in-process link
pub struct MemoryLink {
    rx: mpsc::Receiver<Vec<u8>>,
    tx: mpsc::Sender<Vec<u8>>,
}

#[async_trait]
impl Link for MemoryLink {
    async fn read_frame(&mut self, max_len: usize) -> Result<Vec<u8>, ChannelError> {
        let frame = self
            .rx
            .recv()
            .await
            .ok_or_else(|| ChannelError::Broken("peer disconnected".to_string()))?;
        if frame.len() > max_len {
            return Err(ChannelError::FrameTooLarge {
                len: frame.len(),
                limit: max_len,
            });
        }
        Ok(frame)
    }

    async fn write_frame(&mut self, frame: &[u8]) -> Result<(), ChannelError> {
        self.tx
            .send(frame.to_vec())
            .await
            .map_err(|_| ChannelError::Broken("peer disconnected".to_string()))
    }
}

/// Platform end of an in-process link; dropping it disconnects
pub struct PeerLink {
    tx: mpsc::Sender<Vec<u8>>,
    rx: mpsc::Receiver<Vec<u8>>,
}

impl PeerLink {
    pub async fn send(&self, frame: &[u8]) -> Result<(), ChannelError> {
        self.tx
            .send(frame.to_vec())
            .await
            .map_err(|_| ChannelError::Broken("local side gone".to_string()))
    }

    /// Send a JSON value as one frame
    pub async fn send_json(&self, value: &serde_json::Value) -> Result<(), ChannelError> {
        self.send(value.to_string().as_bytes()).await
    }

    /// Next frame written by the local side, `None` once it disconnected
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }

    /// Next frame parsed as JSON
    pub async fn recv_json(&mut self) -> Option<serde_json::Value> {
        let frame = self.recv().await?;
        serde_json::from_slice(&frame).ok()
    }

    pub fn disconnect(self) {}
}
