//! Hermes Ports
//!
//! Port definitions (traits) for the Hermes bridge.
//! These define the boundaries between domain logic and infrastructure.

mod clock;

pub use clock::Clock;
