//! Hermes Order Ledger
//!
//! The authoritative in-memory record of orders sent to the platform:
//! - **Pending**: submitted, no platform response yet
//! - **Active**: the platform reported a fill (full or partial)
//! - **History**: rejected or canceled, terminal
//!
//! ## Architecture
//!
//! ```text
//! submit(spec) ──► Pending ──► order_request ──► Outbound pipe
//!                     │
//! Dispatcher ─► order_response ──┬─ filled / partially_filled ──► Active
//!                                └─ rejected / canceled ─────────► History
//!                                          │
//!                                          ▼
//!                                 order-update subscribers
//!
//! Dispatcher ─► market_data ──► per-symbol cache ──► market-data subscribers
//! Dispatcher ─► error ────────► error subscribers
//! ```
//!
//! An order id lives in exactly one bucket at a time. Subscribers receive
//! copies; the live records stay behind the ledger's lock.

pub mod book;
pub mod error;
pub mod ids;
pub mod ledger;

pub use book::{Bucket, LedgerBook, Transition};
pub use error::{LedgerError, Result};
pub use ids::OrderIdGenerator;
pub use ledger::{OrderLedger, PlatformError};
