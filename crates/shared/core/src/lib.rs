//! Hermes Core Domain
//!
//! Pure domain types for the Hermes bridge between a local process and a
//! trading platform. This crate contains no async, no I/O, and is 100% unit
//! testable.

pub mod entities;
pub mod market;
pub mod values;

// Re-export commonly used types at crate root
pub use entities::{Order, OrderId, OrderKind, OrderSpec, OrderStatus, Side};
pub use market::{AccountInfo, BookLevel, MarketData, MarketInfo, OrderBook, RefreshSnapshot, TradePrint};
pub use values::{Price, Quantity, Symbol, Timestamp, from_epoch_seconds, to_epoch_seconds};
