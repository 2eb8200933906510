//! Unix domain socket transport
//!
//! Sockets are byte streams, so each frame is terminated by a single NUL
//! byte. Serving channels remove a stale socket file before binding and
//! again when the endpoint is dropped.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{debug, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};

use crate::error::ChannelError;
use crate::transport::{Link, Transport, classify_io};

const FRAME_DELIMITER: u8 = 0;
const READ_CHUNK: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, Default)]
pub struct UnixSocketTransport;

/// Bound socket; unlinks its path on drop
pub struct SocketEndpoint {
    listener: UnixListener,
    path: PathBuf,
}

impl Drop for SocketEndpoint {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            debug!("Could not remove socket {}: {}", self.path.display(), e);
        }
    }
}

#[async_trait]
impl Transport for UnixSocketTransport {
    type Listener = SocketEndpoint;
    type Link = SocketLink;

    async fn bind(&self, name: &str) -> Result<SocketEndpoint, ChannelError> {
        let path = Path::new(name);
        if path.exists() {
            warn!("Removing stale socket {}", path.display());
            let _ = std::fs::remove_file(path);
        }
        let listener = UnixListener::bind(path).map_err(|e| ChannelError::Create {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        Ok(SocketEndpoint {
            listener,
            path: path.to_path_buf(),
        })
    }

    async fn accept(&self, listener: &mut SocketEndpoint) -> Result<SocketLink, ChannelError> {
        let (stream, _) = listener
            .listener
            .accept()
            .await
            .map_err(|e| ChannelError::Connect {
                name: listener.path.display().to_string(),
                reason: e.to_string(),
            })?;
        Ok(SocketLink::new(stream))
    }

    async fn dial(&self, name: &str) -> Result<SocketLink, ChannelError> {
        let stream = UnixStream::connect(name)
            .await
            .map_err(|e| ChannelError::Connect {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        Ok(SocketLink::new(stream))
    }
}

/// NUL-delimited frame stream over a socket
pub struct SocketLink {
    stream: UnixStream,
    buf: Vec<u8>,
    // Dropping the remainder of an oversized frame
    discarding: bool,
}

impl SocketLink {
    fn new(stream: UnixStream) -> Self {
        Self {
            stream,
            buf: Vec::with_capacity(READ_CHUNK),
            discarding: false,
        }
    }

    /// Pop the next complete frame out of the buffer
    fn take_frame(&mut self) -> Option<Vec<u8>> {
        loop {
            let pos = self.buf.iter().position(|b| *b == FRAME_DELIMITER)?;
            let mut frame: Vec<u8> = self.buf.drain(..=pos).collect();
            frame.pop();
            if self.discarding {
                self.discarding = false;
                continue;
            }
            if !frame.is_empty() {
                return Some(frame);
            }
        }
    }
}

#[async_trait]
impl Link for SocketLink {
    async fn read_frame(&mut self, max_len: usize) -> Result<Vec<u8>, ChannelError> {
        loop {
            if let Some(frame) = self.take_frame() {
                if frame.len() > max_len {
                    return Err(ChannelError::FrameTooLarge {
                        len: frame.len(),
                        limit: max_len,
                    });
                }
                return Ok(frame);
            }
            if self.buf.len() > max_len {
                let len = self.buf.len();
                self.buf.clear();
                self.discarding = true;
                return Err(ChannelError::FrameTooLarge { len, limit: max_len });
            }

            let mut chunk = [0u8; READ_CHUNK];
            let n = self.stream.read(&mut chunk).await.map_err(classify_io)?;
            if n == 0 {
                return Err(ChannelError::Broken("peer closed the socket".to_string()));
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    async fn write_frame(&mut self, frame: &[u8]) -> Result<(), ChannelError> {
        self.stream.write_all(frame).await.map_err(classify_io)?;
        self.stream
            .write_all(&[FRAME_DELIMITER])
            .await
            .map_err(classify_io)?;
        self.stream.flush().await.map_err(classify_io)
    }
}
