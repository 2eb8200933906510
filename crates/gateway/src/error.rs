//! Error types for the gateway crate

use thiserror::Error;

/// Channel (transport) level errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Failed to create channel {name}: {reason}")]
    Create { name: String, reason: String },

    #[error("Failed to connect channel {name}: {reason}")]
    Connect { name: String, reason: String },

    /// The peer went away; drives reconnection
    #[error("Channel broken: {0}")]
    Broken(String),

    /// Closed locally; never retried by the channel itself
    #[error("Channel closed")]
    Closed,

    #[error("Channel not connected")]
    NotConnected,

    #[error("Frame of {len} bytes exceeds the {limit} byte limit")]
    FrameTooLarge { len: usize, limit: usize },

    #[error("Timeout waiting for {0}")]
    Timeout(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl ChannelError {
    /// True when the peer disconnected
    pub fn is_broken(&self) -> bool {
        matches!(self, ChannelError::Broken(_))
    }
}

/// Wire protocol errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Malformed payload; the raw bytes are kept for diagnostics
    #[error("Malformed payload ({} bytes): {reason}", raw.len())]
    Decode { reason: String, raw: Vec<u8> },

    #[error("Encoding failed: {0}")]
    Encode(String),

    #[error("Frame of {len} bytes exceeds the {limit} byte limit")]
    FrameTooLarge { len: usize, limit: usize },
}

impl ProtocolError {
    /// Raw payload of a decode failure, lossily converted for logging
    pub fn raw_lossy(&self) -> Option<String> {
        match self {
            ProtocolError::Decode { raw, .. } => Some(String::from_utf8_lossy(raw).into_owned()),
            _ => None,
        }
    }
}

/// The platform answered a command with `status: error`
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Command failed: {message}")]
pub struct CommandError {
    pub message: String,
}

/// Gateway-level errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Command(#[from] CommandError),
}

pub type Result<T> = std::result::Result<T, GatewayError>;
