//! Windows named pipe transport
//!
//! Pipes are created in message mode, so one read returns one whole frame.
//! A frame that does not fit the read buffer surfaces as `ERROR_MORE_DATA`.

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::windows::named_pipe::{
    ClientOptions, NamedPipeClient, NamedPipeServer, PipeMode, ServerOptions,
};

use crate::codec::MAX_FRAME_LEN;
use crate::error::ChannelError;
use crate::transport::{Link, Transport, classify_io};

const ERROR_PIPE_BUSY: i32 = 231;
const ERROR_MORE_DATA: i32 = 234;

#[derive(Debug, Clone, Copy, Default)]
pub struct NamedPipeTransport;

/// A created pipe name with the instance waiting for a client
pub struct PipeEndpoint {
    name: String,
    pending: Option<NamedPipeServer>,
}

fn create_instance(name: &str, first: bool) -> Result<NamedPipeServer, ChannelError> {
    ServerOptions::new()
        .first_pipe_instance(first)
        .pipe_mode(PipeMode::Message)
        .in_buffer_size(MAX_FRAME_LEN as u32)
        .out_buffer_size(MAX_FRAME_LEN as u32)
        .create(name)
        .map_err(|e| ChannelError::Create {
            name: name.to_string(),
            reason: e.to_string(),
        })
}

#[async_trait]
impl Transport for NamedPipeTransport {
    type Listener = PipeEndpoint;
    type Link = PipeLink;

    async fn bind(&self, name: &str) -> Result<PipeEndpoint, ChannelError> {
        let server = create_instance(name, true)?;
        Ok(PipeEndpoint {
            name: name.to_string(),
            pending: Some(server),
        })
    }

    async fn accept(&self, listener: &mut PipeEndpoint) -> Result<PipeLink, ChannelError> {
        let server = match listener.pending.take() {
            Some(server) => server,
            None => create_instance(&listener.name, false)?,
        };
        server.connect().await.map_err(|e| ChannelError::Connect {
            name: listener.name.clone(),
            reason: e.to_string(),
        })?;
        Ok(PipeLink::Server(server))
    }

    async fn dial(&self, name: &str) -> Result<PipeLink, ChannelError> {
        let client = ClientOptions::new()
            .pipe_mode(PipeMode::Message)
            .open(name)
            .map_err(|e| {
                let reason = match e.raw_os_error() {
                    Some(ERROR_PIPE_BUSY) => "all pipe instances are busy".to_string(),
                    _ => e.to_string(),
                };
                ChannelError::Connect {
                    name: name.to_string(),
                    reason,
                }
            })?;
        Ok(PipeLink::Client(client))
    }
}

/// One end of a connected named pipe
pub enum PipeLink {
    Server(NamedPipeServer),
    Client(NamedPipeClient),
}

#[async_trait]
impl Link for PipeLink {
    async fn read_frame(&mut self, max_len: usize) -> Result<Vec<u8>, ChannelError> {
        let mut buf = vec![0u8; max_len];
        let read = match self {
            PipeLink::Server(pipe) => pipe.read(&mut buf).await,
            PipeLink::Client(pipe) => pipe.read(&mut buf).await,
        };
        let n = match read {
            Ok(n) => n,
            Err(e) if e.raw_os_error() == Some(ERROR_MORE_DATA) => {
                return Err(ChannelError::FrameTooLarge {
                    len: max_len + 1,
                    limit: max_len,
                });
            }
            Err(e) => return Err(classify_io(e)),
        };
        if n == 0 {
            return Err(ChannelError::Broken("pipe closed by peer".to_string()));
        }
        buf.truncate(n);
        Ok(buf)
    }

    async fn write_frame(&mut self, frame: &[u8]) -> Result<(), ChannelError> {
        let written = match self {
            PipeLink::Server(pipe) => pipe.write_all(frame).await,
            PipeLink::Client(pipe) => pipe.write_all(frame).await,
        };
        written.map_err(classify_io)
    }
}
