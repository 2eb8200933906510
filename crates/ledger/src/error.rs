//! Order Ledger errors

use hermes_core::OrderId;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    #[error("Failed to send order {order_id}: {reason}")]
    SendFailed { order_id: OrderId, reason: String },

    #[error("Unknown order: {0}")]
    UnknownOrder(OrderId),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
