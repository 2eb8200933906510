//! Hermes Gateway
//!
//! Gateway layer between a local process and the trading platform. Provides:
//! - Transport abstraction over local pipes (named pipes on Windows, Unix
//!   domain sockets elsewhere, an in-memory transport for tests)
//! - The [`Channel`] lifecycle state machine
//! - Wire message types and the JSON codec
//! - A connection manager with bounded retry for request/response commands
//! - A dispatcher fanning pushed envelopes out to subscribers
//! - Activity tracking and the heartbeat (liveness) monitor
//!
//! ## Architecture
//!
//! ```text
//!                 Trading platform
//!        ┌───────────┬──────────────┬────────────┐
//!        │ command   │ inbound      │ outbound   │
//!        │ (duplex)  │ (events in)  │ (orders)   │
//!   ┌────▼─────┐ ┌───▼────────┐ ┌───▲────────┐   │
//!   │Connection│ │ Dispatcher │ │   Pipe     │   │
//!   │ Manager  │ │            │ │ Publisher  │   │
//!   └────┬─────┘ └───┬────────┘ └───▲────────┘   │
//!        │           │ market_data, order_response, error, heartbeat
//!        ▼           ▼              │
//!    callers     subscribers ──► Order Ledger
//!                    │
//!             Activity tracker ◄── Heartbeat monitor
//! ```
//!
//! Command responses and pushed events never share a read call: the command
//! pipe is read only by the connection manager, the inbound pipe only by the
//! dispatcher.

pub mod codec;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod heartbeat;
pub mod messages;
pub mod transport;

// Re-export commonly used types
pub use codec::{Frame, MAX_FRAME_LEN};
pub use connection::{ConnectionConfig, ConnectionManager, ConnectionState};
pub use dispatcher::{CallbackList, DispatchExit, Dispatcher, SubscriptionId, Subscriptions};
pub use error::{ChannelError, CommandError, GatewayError, ProtocolError};
pub use heartbeat::{ActivityTracker, Health, HeartbeatConfig, HeartbeatMonitor, LinkHealth, Liveness};
pub use messages::{
    command::{CommandKinds, Command, Response, ResponseStatus},
    envelope::{Envelope, MessageKind},
};
pub use transport::{
    Channel, ChannelRole, ChannelState, Link, PlatformTransport, Publisher, Subscriber, Transport,
    broadcast::{BroadcastPublisher, BroadcastSubscriber},
    memory::{MemoryPeer, MemoryTransport, PeerLink},
    pipe::PipePublisher,
};
