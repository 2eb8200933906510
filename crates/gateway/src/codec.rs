//! JSON codec for pipe frames
//!
//! One frame holds exactly one JSON object encoded as UTF-8. Peers may pad a
//! frame with trailing NUL bytes; those are stripped before parsing.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::ProtocolError;
use crate::messages::{Envelope, Response};

/// Largest frame accepted or produced on any pipe
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// A decoded frame, classified once by the fields it carries
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Carries `status`: the answer to a command
    Response(Response),
    /// Carries `type` and `timestamp`: a pushed event
    Event(Envelope),
}

impl Frame {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Frame::Response(_) => "response",
            Frame::Event(_) => "event",
        }
    }

    pub fn into_response(self) -> Result<Response, ProtocolError> {
        match self {
            Frame::Response(resp) => Ok(resp),
            Frame::Event(env) => Err(ProtocolError::Decode {
                reason: format!("expected a response, got a {} event", env.kind),
                raw: Vec::new(),
            }),
        }
    }

    pub fn into_envelope(self) -> Result<Envelope, ProtocolError> {
        match self {
            Frame::Event(env) => Ok(env),
            Frame::Response(_) => Err(ProtocolError::Decode {
                reason: "expected an event, got a command response".to_string(),
                raw: Vec::new(),
            }),
        }
    }
}

/// Serialize a message into frame bytes
pub fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>, ProtocolError> {
    let bytes = serde_json::to_vec(msg).map_err(|e| ProtocolError::Encode(e.to_string()))?;
    if bytes.len() > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge {
            len: bytes.len(),
            limit: MAX_FRAME_LEN,
        });
    }
    Ok(bytes)
}

/// Drop trailing NUL padding
pub fn strip_padding(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().rposition(|b| *b != 0).map_or(0, |pos| pos + 1);
    &bytes[..end]
}

/// Parse frame bytes into a [`Frame`]
pub fn decode(bytes: &[u8]) -> Result<Frame, ProtocolError> {
    let payload = strip_padding(bytes);
    let malformed = |reason: String| ProtocolError::Decode {
        reason,
        raw: bytes.to_vec(),
    };

    let value: Value = serde_json::from_slice(payload).map_err(|e| malformed(e.to_string()))?;
    let Value::Object(object) = value else {
        return Err(malformed("payload is not a JSON object".to_string()));
    };

    if object.contains_key("status") {
        from_object(object)
            .map(Frame::Response)
            .map_err(|e| malformed(format!("invalid response: {e}")))
    } else if object.contains_key("type") && object.contains_key("timestamp") {
        from_object(object)
            .map(Frame::Event)
            .map_err(|e| malformed(format!("invalid envelope: {e}")))
    } else {
        Err(malformed("neither a response nor an event".to_string()))
    }
}

pub fn decode_response(bytes: &[u8]) -> Result<Response, ProtocolError> {
    decode(bytes)?.into_response()
}

pub fn decode_envelope(bytes: &[u8]) -> Result<Envelope, ProtocolError> {
    decode(bytes)?.into_envelope()
}

fn from_object<T: serde::de::DeserializeOwned>(
    object: Map<String, Value>,
) -> Result<T, serde_json::Error> {
    serde_json::from_value(Value::Object(object))
}
