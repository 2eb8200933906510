//! Publisher writing encoded messages to a pipe channel

use std::sync::Arc;

use async_trait::async_trait;
use log::{error, warn};
use serde::Serialize;

use crate::codec;
use crate::error::{ChannelError, GatewayError};
use crate::transport::{Channel, Publisher, Transport};

/// Sends each published message as one frame on a connected channel
pub struct PipePublisher<T: Transport> {
    channel: Arc<Channel<T>>,
}

impl<T: Transport> PipePublisher<T> {
    pub fn new(channel: Arc<Channel<T>>) -> Self {
        Self { channel }
    }

    pub fn channel(&self) -> &Arc<Channel<T>> {
        &self.channel
    }
}

#[async_trait]
impl<T, M> Publisher<M> for PipePublisher<T>
where
    T: Transport,
    M: Serialize + Send + Sync,
{
    async fn publish(&self, msg: &M) -> Result<(), GatewayError> {
        if !self.channel.is_connected() {
            warn!("Cannot send on {}: not connected", self.channel.name());
            return Err(ChannelError::NotConnected.into());
        }
        let frame = codec::encode(msg)?;
        self.channel.write(&frame).await.map_err(|e| {
            error!("Error sending on {}: {}", self.channel.name(), e);
            GatewayError::from(e)
        })
    }
}
