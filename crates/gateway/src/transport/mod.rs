//! Transport abstraction layer
//!
//! A [`Transport`] knows how to create and open local pipe endpoints and
//! yields a [`Link`] that moves whole frames. [`Channel`] wraps a transport
//! with the connection lifecycle every pipe shares.
//!
//! Platform transports:
//! - Windows: named pipes in message mode ([`windows::NamedPipeTransport`])
//! - Unix: domain sockets with NUL-delimited frames ([`unix::UnixSocketTransport`])
//!
//! [`memory::MemoryTransport`] pairs a channel with an in-process peer for tests.

pub mod broadcast;
pub mod channel;
pub mod memory;
pub mod pipe;
#[cfg(unix)]
pub mod unix;
#[cfg(windows)]
pub mod windows;

pub use channel::{Channel, ChannelRole, ChannelState};

use crate::error::{ChannelError, GatewayError};
use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use std::io;

/// Pipe transport of the host platform
#[cfg(unix)]
pub type PlatformTransport = unix::UnixSocketTransport;

/// Pipe transport of the host platform
#[cfg(windows)]
pub type PlatformTransport = windows::NamedPipeTransport;

/// Creates and opens pipe endpoints
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// A created endpoint waiting for its peer
    type Listener: Send + 'static;
    /// An attached, frame-oriented connection
    type Link: Link;

    /// Create the endpoint `name` (serving side)
    async fn bind(&self, name: &str) -> Result<Self::Listener, ChannelError>;

    /// Wait until the peer attaches to a created endpoint
    async fn accept(&self, listener: &mut Self::Listener) -> Result<Self::Link, ChannelError>;

    /// Open the endpoint `name` created by the peer (dialing side)
    async fn dial(&self, name: &str) -> Result<Self::Link, ChannelError>;
}

/// A connected pipe moving whole frames
#[async_trait]
pub trait Link: Send + 'static {
    /// Next frame; frames longer than `max_len` fail with `FrameTooLarge`
    async fn read_frame(&mut self, max_len: usize) -> Result<Vec<u8>, ChannelError>;

    /// Write one complete frame
    async fn write_frame(&mut self, frame: &[u8]) -> Result<(), ChannelError>;
}

/// Publisher - sends messages somewhere
#[async_trait]
pub trait Publisher<M>: Send + Sync
where
    M: Serialize + Send + Sync,
{
    async fn publish(&self, msg: &M) -> Result<(), GatewayError>;
}

/// Subscriber - receives published messages
#[async_trait]
pub trait Subscriber<M>: Send
where
    M: DeserializeOwned + Send,
{
    /// Wait for the next message
    async fn next(&mut self) -> Result<M, GatewayError>;

    /// Try to receive without blocking (returns None if no message available)
    fn try_next(&mut self) -> Result<Option<M>, GatewayError>;
}

/// Map an OS error onto the channel taxonomy
///
/// Disconnect-class errors become `Broken` so callers reconnect.
pub(crate) fn classify_io(err: io::Error) -> ChannelError {
    match err.kind() {
        io::ErrorKind::BrokenPipe
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::NotConnected
        | io::ErrorKind::UnexpectedEof => ChannelError::Broken(err.to_string()),
        _ => ChannelError::Io(err.to_string()),
    }
}
