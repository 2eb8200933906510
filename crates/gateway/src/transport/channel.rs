//! Pipe channel lifecycle
//!
//! ```text
//! Uninitialized ──open──► Created ──connect──► Connecting ──► Connected
//!                                                   │             │
//!                                                 error     peer gone
//!                                                   ▼             ▼
//!                                                Broken ◄─────────┘
//!        any state ──close──► Closed ──open/connect──► Created ...
//! ```
//!
//! A channel holds one link at a time. Reads and writes on the same channel
//! are serialized; `close()` aborts any in-flight read, write or connect.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::{Mutex, watch};

use crate::error::ChannelError;
use crate::transport::{Link, Transport};

/// How often a dialing channel retries while the peer's endpoint is absent
pub const DIAL_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Which side creates the endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRole {
    /// Create the endpoint and wait for the peer
    Serve,
    /// Open an endpoint the peer created
    Dial,
}

/// Lifecycle state of a [`Channel`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Uninitialized,
    Created,
    Connecting,
    Connected,
    Broken,
    Closed,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChannelState::Uninitialized => "uninitialized",
            ChannelState::Created => "created",
            ChannelState::Connecting => "connecting",
            ChannelState::Connected => "connected",
            ChannelState::Broken => "broken",
            ChannelState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// A named, bidirectional pipe endpoint
pub struct Channel<T: Transport> {
    name: String,
    role: ChannelRole,
    transport: Arc<T>,
    listener: Mutex<Option<T::Listener>>,
    link: Mutex<Option<T::Link>>,
    state: watch::Sender<ChannelState>,
    // Bumped on every close; in-flight operations abort when it moves
    closes: watch::Sender<u64>,
}

impl<T: Transport> Channel<T> {
    pub fn new(name: impl Into<String>, role: ChannelRole, transport: T) -> Self {
        Self::with_shared(name, role, Arc::new(transport))
    }

    /// Channel over a transport shared with other channels
    pub fn with_shared(name: impl Into<String>, role: ChannelRole, transport: Arc<T>) -> Self {
        let (state, _) = watch::channel(ChannelState::Uninitialized);
        let (closes, _) = watch::channel(0);
        Self {
            name: name.into(),
            role,
            transport,
            listener: Mutex::new(None),
            link: Mutex::new(None),
            state,
            closes,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> ChannelRole {
        self.role
    }

    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ChannelState::Connected
    }

    /// Watch state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<ChannelState> {
        self.state.subscribe()
    }

    /// Create the endpoint
    ///
    /// Serving channels bind the name; dialing channels only arm themselves.
    /// Opening an already open channel is a no-op. A broken channel must be
    /// closed first.
    pub async fn open(&self) -> Result<(), ChannelError> {
        match self.state() {
            ChannelState::Created | ChannelState::Connecting | ChannelState::Connected => {
                return Ok(());
            }
            ChannelState::Broken => {
                return Err(ChannelError::Broken(format!(
                    "{} must be closed before reopening",
                    self.name
                )));
            }
            ChannelState::Uninitialized | ChannelState::Closed => {}
        }

        if self.role == ChannelRole::Serve {
            let listener = self.transport.bind(&self.name).await?;
            *self.listener.lock().await = Some(listener);
        }
        self.state.send_replace(ChannelState::Created);
        debug!("Channel {} created", self.name);
        Ok(())
    }

    /// Attach to the peer
    ///
    /// Serving channels wait for the peer; dialing channels retry every
    /// [`DIAL_RETRY_INTERVAL`] until the endpoint exists. With a `timeout`
    /// the wait is bounded. Any failure leaves the channel `Broken`.
    pub async fn connect(&self, timeout: Option<Duration>) -> Result<(), ChannelError> {
        if self.is_connected() {
            return Ok(());
        }
        self.open().await?;

        let mut cancel = self.closes.subscribe();
        self.state.send_replace(ChannelState::Connecting);
        info!("Waiting for peer on {}", self.name);

        let attach = async {
            let link = match self.role {
                ChannelRole::Serve => {
                    let mut guard = self.listener.lock().await;
                    let Some(listener) = guard.as_mut() else {
                        return Err(ChannelError::Closed);
                    };
                    self.transport.accept(listener).await?
                }
                ChannelRole::Dial => self.dial_until_ready().await,
            };
            Ok::<_, ChannelError>(link)
        };
        let bounded = async {
            match timeout {
                Some(limit) => tokio::time::timeout(limit, attach).await.unwrap_or_else(|_| {
                    Err(ChannelError::Timeout(format!(
                        "peer on {} after {:?}",
                        self.name, limit
                    )))
                }),
                None => attach.await,
            }
        };

        let outcome = tokio::select! {
            outcome = bounded => outcome,
            _ = cancel.changed() => Err(ChannelError::Closed),
        };

        match outcome {
            Ok(link) => {
                let mut slot = self.link.lock().await;
                let attached = self.state.send_if_modified(|state| {
                    if *state == ChannelState::Connecting {
                        *state = ChannelState::Connected;
                        true
                    } else {
                        false
                    }
                });
                if !attached {
                    return Err(ChannelError::Closed);
                }
                *slot = Some(link);
                info!("Channel {} connected", self.name);
                Ok(())
            }
            Err(ChannelError::Closed) => Err(ChannelError::Closed),
            Err(e) => {
                self.transition(ChannelState::Connecting, ChannelState::Broken);
                warn!("Channel {} failed to connect: {}", self.name, e);
                Err(ChannelError::Connect {
                    name: self.name.clone(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Read one frame of at most `max_len` bytes
    ///
    /// Fails with `Broken` (and moves the channel there) when the peer is
    /// gone, `Closed` when `close()` ran meanwhile.
    pub async fn read(&self, max_len: usize) -> Result<Vec<u8>, ChannelError> {
        let mut cancel = self.closes.subscribe();
        let mut guard = self.link.lock().await;
        let Some(link) = guard.as_mut() else {
            return Err(self.detached_error());
        };

        let result = tokio::select! {
            result = link.read_frame(max_len) => result,
            _ = cancel.changed() => Err(ChannelError::Closed),
        };
        self.note_failure(&result);
        result
    }

    /// Write one frame
    pub async fn write(&self, frame: &[u8]) -> Result<(), ChannelError> {
        let mut cancel = self.closes.subscribe();
        let mut guard = self.link.lock().await;
        let Some(link) = guard.as_mut() else {
            return Err(self.detached_error());
        };

        let result = tokio::select! {
            result = link.write_frame(frame) => result,
            _ = cancel.changed() => Err(ChannelError::Closed),
        };
        self.note_failure(&result);
        result
    }

    /// Release the link and the endpoint
    ///
    /// Idempotent and valid from any state.
    pub async fn close(&self) {
        self.closes.send_modify(|generation| *generation += 1);
        let previous = self.state.send_replace(ChannelState::Closed);
        self.link.lock().await.take();
        self.listener.lock().await.take();
        if previous != ChannelState::Closed {
            debug!("Channel {} closed (was {})", self.name, previous);
        }
    }

    async fn dial_until_ready(&self) -> T::Link {
        let mut attempts: u64 = 0;
        loop {
            match self.transport.dial(&self.name).await {
                Ok(link) => return link,
                Err(e) => {
                    attempts += 1;
                    if attempts == 1 || attempts % 30 == 0 {
                        debug!("Endpoint {} not ready ({} attempts): {}", self.name, attempts, e);
                    }
                    tokio::time::sleep(DIAL_RETRY_INTERVAL).await;
                }
            }
        }
    }

    fn detached_error(&self) -> ChannelError {
        match self.state() {
            ChannelState::Closed => ChannelError::Closed,
            _ => ChannelError::NotConnected,
        }
    }

    fn note_failure<R>(&self, result: &Result<R, ChannelError>) {
        if let Err(ChannelError::Broken(reason)) = result {
            if self.transition(ChannelState::Connected, ChannelState::Broken) {
                warn!("Channel {} broken: {}", self.name, reason);
            }
        }
    }

    fn transition(&self, from: ChannelState, to: ChannelState) -> bool {
        self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::MemoryTransport;

    fn serving() -> (Channel<MemoryTransport>, crate::transport::memory::MemoryPeer) {
        let (transport, peer) = MemoryTransport::new();
        (Channel::new("test_pipe", ChannelRole::Serve, transport), peer)
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let (channel, peer) = serving();
        assert_eq!(channel.state(), ChannelState::Uninitialized);

        channel.open().await.unwrap();
        assert_eq!(channel.state(), ChannelState::Created);

        let mut remote = peer.attach().await.unwrap();
        channel.connect(None).await.unwrap();
        assert!(channel.is_connected());

        channel.write(b"ping").await.unwrap();
        assert_eq!(remote.recv().await.unwrap(), b"ping");

        remote.send(b"pong").await.unwrap();
        assert_eq!(channel.read(1024).await.unwrap(), b"pong");

        channel.close().await;
        assert_eq!(channel.state(), ChannelState::Closed);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (channel, _peer) = serving();
        channel.close().await;
        channel.close().await;
        assert_eq!(channel.state(), ChannelState::Closed);
    }

    #[tokio::test]
    async fn test_read_before_connect() {
        let (channel, _peer) = serving();
        assert_eq!(channel.read(16).await, Err(ChannelError::NotConnected));

        channel.close().await;
        assert_eq!(channel.read(16).await, Err(ChannelError::Closed));
    }

    #[tokio::test]
    async fn test_peer_disconnect_breaks_channel() {
        let (channel, peer) = serving();
        let remote = peer.attach().await.unwrap();
        channel.connect(None).await.unwrap();

        drop(remote);
        assert!(channel.read(1024).await.unwrap_err().is_broken());
        assert_eq!(channel.state(), ChannelState::Broken);

        // Broken channels must be closed before reopening
        assert!(channel.open().await.is_err());
        channel.close().await;
        channel.open().await.unwrap();
        assert_eq!(channel.state(), ChannelState::Created);
    }

    #[tokio::test]
    async fn test_close_aborts_pending_read() {
        let (channel, peer) = serving();
        let _remote = peer.attach().await.unwrap();
        channel.connect(None).await.unwrap();

        let channel = Arc::new(channel);
        let reader = {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move { channel.read(1024).await })
        };
        tokio::task::yield_now().await;

        channel.close().await;
        assert_eq!(reader.await.unwrap(), Err(ChannelError::Closed));
    }

    #[tokio::test]
    async fn test_close_aborts_pending_connect() {
        let (channel, _peer) = serving();
        let channel = Arc::new(channel);
        let connecting = {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move { channel.connect(None).await })
        };
        tokio::task::yield_now().await;

        channel.close().await;
        assert_eq!(connecting.await.unwrap(), Err(ChannelError::Closed));
        assert_eq!(channel.state(), ChannelState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout_leaves_channel_broken() {
        let (channel, _peer) = serving();
        let err = channel
            .connect(Some(Duration::from_secs(2)))
            .await
            .unwrap_err();

        assert!(matches!(err, ChannelError::Connect { .. }));
        assert_eq!(channel.state(), ChannelState::Broken);
    }

    #[tokio::test]
    async fn test_create_failure() {
        let (transport, _peer) = MemoryTransport::new();
        transport.refuse_bind(true);
        let channel = Channel::new("test_pipe", ChannelRole::Serve, transport);

        assert!(matches!(channel.open().await, Err(ChannelError::Create { .. })));
        assert_eq!(channel.state(), ChannelState::Uninitialized);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dial_waits_for_endpoint() {
        let (transport, peer) = MemoryTransport::new();
        let channel = Arc::new(Channel::new("outbound", ChannelRole::Dial, transport));

        let dialing = {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move { channel.connect(None).await })
        };
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(channel.state(), ChannelState::Connecting);

        let _remote = peer.attach().await.unwrap();
        dialing.await.unwrap().unwrap();
        assert!(channel.is_connected());
    }
}
