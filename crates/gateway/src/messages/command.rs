//! Request/response messages carried on the command pipe

use hermes_core::Side;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::CommandError;

/// Command names understood by the platform
pub struct CommandKinds;

impl CommandKinds {
    /// Market and account snapshot
    pub const REFRESH: &'static str = "refresh";

    /// Configure the platform-side algorithm: `{range, active}`
    pub const ALGO: &'static str = "algo";

    /// Place a limit order: `{price, size}`
    pub const LIMIT: &'static str = "limit";

    /// Place an order at the current mid price: `{size, side}`
    pub const MID_PRICE: &'static str = "mid_price";
}

/// A request sent on the command pipe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    #[serde(rename = "command")]
    pub kind: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl Command {
    pub fn new(kind: impl Into<String>, params: Map<String, Value>) -> Self {
        Self {
            kind: kind.into(),
            params,
        }
    }

    pub fn refresh() -> Self {
        Self::new(CommandKinds::REFRESH, Map::new())
    }

    pub fn algo(range: Decimal, active: bool) -> Self {
        Self::new(CommandKinds::ALGO, params(json!({ "range": range, "active": active })))
    }

    pub fn limit(price: Decimal, size: Decimal) -> Self {
        Self::new(CommandKinds::LIMIT, params(json!({ "price": price, "size": size })))
    }

    pub fn mid_price(size: Decimal, side: Side) -> Self {
        Self::new(CommandKinds::MID_PRICE, params(json!({ "size": size, "side": side })))
    }
}

fn params(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Outcome reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// The platform's answer to exactly one [`Command`]
///
/// `message` is present only when `status` is `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub status: ResponseStatus,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Response {
    pub fn success(data: Map<String, Value>) -> Self {
        Self {
            status: ResponseStatus::Success,
            data,
            message: None,
        }
    }

    /// Synthesized locally when the exchange itself could not complete
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            data: Map::new(),
            message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }

    /// Error text, or a placeholder when the platform sent none
    pub fn error_message(&self) -> &str {
        self.message.as_deref().unwrap_or("unknown error")
    }

    /// Success data, or the error message as a [`CommandError`]
    pub fn into_result(self) -> Result<Map<String, Value>, CommandError> {
        match self.status {
            ResponseStatus::Success => Ok(self.data),
            ResponseStatus::Error => Err(CommandError {
                message: self.message.unwrap_or_else(|| "unknown error".to_string()),
            }),
        }
    }
}
