//! Hermes Runner - bridge process
//!
//! Wires the gateway and the ledger into one supervised process:
//!
//! - **Config**: JSON settings with defaults for every key
//! - **Logging**: `env_logger` setup driven by the config
//! - **Bridge**: owns the pipes and the long-running tasks
//! - **Console**: stdin commands for an operator
//!
//! ## Architecture
//!
//! ```text
//!                    ┌──────────────────────────────┐
//!                    │            Bridge            │
//!                    │                              │
//!   console ───────► │  ConnectionManager ◄──────── command pipe ◄──► platform
//!                    │                              │
//!                    │  Dispatcher ◄─────────────── inbound pipe ◄─── platform
//!                    │     │                        │
//!                    │     ▼                        │
//!                    │  OrderLedger ──────────────► outbound pipe ──► platform
//!                    │                              │
//!                    │  HeartbeatMonitor, auto-refresh
//!                    └──────────────────────────────┘
//! ```

pub mod bridge;
pub mod config;
pub mod console;
pub mod error;
pub mod logging;

pub use bridge::{Bridge, BridgeTransports, CONNECTION_CHECK_INTERVAL};
pub use config::{BridgeConfig, ConfigSource, LoadedConfig};
pub use console::{ConsoleCommand, execute, parse_line};
pub use error::{Result, RunnerError};
pub use logging::init_logging;
