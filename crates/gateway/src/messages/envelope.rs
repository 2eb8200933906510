//! Event envelopes carried on the inbound and outbound pipes

use chrono::Utc;
use hermes_core::{Timestamp, from_epoch_seconds, to_epoch_seconds};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Tag of a pushed message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    MarketData,
    OrderRequest,
    OrderResponse,
    Error,
    Heartbeat,
}

impl MessageKind {
    pub const ALL: [MessageKind; 5] = [
        MessageKind::MarketData,
        MessageKind::OrderRequest,
        MessageKind::OrderResponse,
        MessageKind::Error,
        MessageKind::Heartbeat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::MarketData => "market_data",
            MessageKind::OrderRequest => "order_request",
            MessageKind::OrderResponse => "order_response",
            MessageKind::Error => "error",
            MessageKind::Heartbeat => "heartbeat",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `{type, timestamp, data}` event as it travels on the wire
///
/// `timestamp` is seconds since the Unix epoch with sub-second precision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub timestamp: f64,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl Envelope {
    /// Envelope stamped with the current wall-clock time
    pub fn new(kind: MessageKind, data: Map<String, Value>) -> Self {
        Self::at(kind, Utc::now(), data)
    }

    pub fn at(kind: MessageKind, at: Timestamp, data: Map<String, Value>) -> Self {
        Self {
            kind,
            timestamp: to_epoch_seconds(at),
            data,
        }
    }

    pub fn sent_at(&self) -> Option<Timestamp> {
        from_epoch_seconds(self.timestamp)
    }

    /// String field of `data`
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }
}
