//! Wire message types for gateway communication
//!
//! Everything on the wire is a single JSON object per frame:
//! - [`command::Command`] / [`command::Response`] travel on the command pipe
//! - [`envelope::Envelope`] travels on the event pipes, tagged by [`envelope::MessageKind`]

pub mod command;
pub mod envelope;

pub use command::{Command, CommandKinds, Response, ResponseStatus};
pub use envelope::{Envelope, MessageKind};
