use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Borrow;
use std::fmt;

use super::{OrderKind, OrderStatus, Side};
use crate::values::to_epoch_seconds;

/// Unique identifier for an order, generated by the submitting side
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for OrderId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// What a caller asks for when placing an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSpec {
    pub symbol: String,
    pub direction: Side,
    pub kind: OrderKind,
    pub price: Decimal,
    pub volume: Decimal,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
}

impl OrderSpec {
    /// Create a limit order spec
    pub fn limit(symbol: impl Into<String>, direction: Side, price: Decimal, volume: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            direction,
            kind: OrderKind::Limit,
            price,
            volume,
            stop_loss: None,
            take_profit: None,
        }
    }

    pub fn with_stop_loss(mut self, stop_loss: Decimal) -> Self {
        self.stop_loss = Some(stop_loss);
        self
    }

    pub fn with_take_profit(mut self, take_profit: Decimal) -> Self {
        self.take_profit = Some(take_profit);
        self
    }

    /// Check the fields the platform would reject outright
    pub fn validate(&self) -> Result<(), String> {
        if self.symbol.trim().is_empty() {
            return Err("symbol must not be empty".to_string());
        }
        if self.volume <= Decimal::ZERO {
            return Err(format!("volume must be positive, got {}", self.volume));
        }
        if self.kind == OrderKind::Limit && self.price <= Decimal::ZERO {
            return Err(format!("limit price must be positive, got {}", self.price));
        }
        Ok(())
    }
}

/// Full order record as kept by the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub symbol: String,
    pub direction: Side,
    pub kind: OrderKind,
    pub price: Decimal,
    pub volume: Decimal,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub status: OrderStatus,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Fields supplied by the platform in order responses (fill price, ticket, reason, ...)
    #[serde(default)]
    pub peer_fields: Map<String, Value>,
}

impl Order {
    /// Create a pending order from a spec
    pub fn from_spec(id: OrderId, spec: OrderSpec, submitted_at: DateTime<Utc>) -> Self {
        Self {
            id,
            symbol: spec.symbol,
            direction: spec.direction,
            kind: spec.kind,
            price: spec.price,
            volume: spec.volume,
            stop_loss: spec.stop_loss,
            take_profit: spec.take_profit,
            status: OrderStatus::Pending,
            submitted_at,
            updated_at: submitted_at,
            peer_fields: Map::new(),
        }
    }

    /// Merge an order response payload into this record
    ///
    /// `status` is parsed into [`OrderStatus`]; every other key except
    /// `order_id` is kept verbatim in `peer_fields`, later values winning.
    pub fn merge_response(&mut self, data: &Map<String, Value>, at: DateTime<Utc>) {
        if let Some(status) = data.get("status") {
            self.status = serde_json::from_value(status.clone()).unwrap_or(OrderStatus::Unknown);
        }
        for (key, value) in data {
            if key == "order_id" || key == "status" {
                continue;
            }
            self.peer_fields.insert(key.clone(), value.clone());
        }
        self.updated_at = at;
    }

    /// Wire payload for an `order_request` envelope
    pub fn to_request_payload(&self) -> Map<String, Value> {
        let mut payload = Map::new();
        payload.insert("order_id".into(), Value::from(self.id.as_str()));
        payload.insert("symbol".into(), Value::from(self.symbol.as_str()));
        payload.insert("type".into(), Value::from(self.kind.as_str()));
        payload.insert("direction".into(), Value::from(self.direction.as_str()));
        payload.insert("price".into(), decimal_value(Some(self.price)));
        payload.insert("volume".into(), decimal_value(Some(self.volume)));
        payload.insert("stop_loss".into(), decimal_value(self.stop_loss));
        payload.insert("take_profit".into(), decimal_value(self.take_profit));
        payload.insert(
            "timestamp".into(),
            Value::from(to_epoch_seconds(self.submitted_at)),
        );
        payload
    }
}

fn decimal_value(value: Option<Decimal>) -> Value {
    value
        .and_then(|d| serde_json::to_value(d).ok())
        .unwrap_or(Value::Null)
}
